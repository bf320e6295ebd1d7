use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use enerzal_core::NoticeKind;
use crate::app::{App, BubbleKind, InputMode, STARTER_PROMPTS};

/// Style one Markdown line for the terminal.
///
/// Handles `#` headings, `-`/`*` bullets, `**bold**`, `*italic*`, and
/// `` `code` ``. Unclosed markers are shown literally, which is what a
/// half-typed reply looks like.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let trimmed = text.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    let after = &trimmed[level..];
    // ATX heading: one to six `#` then a space or end of line
    if (1..=6).contains(&level) && (after.is_empty() || after.starts_with(' ')) {
        return Line::from(Span::styled(
            after.trim().to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let body = match trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        Some(rest) => {
            let indent = text.len() - trimmed.len();
            spans.push(Span::raw(format!("{}• ", " ".repeat(indent))));
            rest
        }
        None => text,
    };

    let mut chars = body.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        let (marker, style) = match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                ("**", Style::default().add_modifier(Modifier::BOLD))
            }
            '*' => ("*", Style::default().add_modifier(Modifier::ITALIC)),
            '`' => ("`", Style::default().fg(Color::Green)),
            _ => {
                current_text.push(c);
                continue;
            }
        };

        // Collect up to the matching closing marker
        let mut inner = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if marker == "**" && c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            if marker != "**" && marker.starts_with(c) {
                found_close = true;
                break;
            }
            inner.push(c);
        }

        if found_close && !inner.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            spans.push(Span::styled(inner, style));
        } else {
            // No closing marker, treat as literal
            current_text.push_str(marker);
            current_text.push_str(&inner);
            if found_close {
                current_text.push_str(marker);
            }
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, composer, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.show_starters() {
        render_starters(app, frame, chat_area);
    } else {
        render_transcript(app, frame, chat_area);
    }

    render_composer(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Enerzal ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}] ", app.config.response_mode.as_str()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(app.config.base_url.clone(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = if app.is_busy() {
        " Waiting for Enerzal... │ PgUp/PgDn scroll │ Ctrl+C quit "
    } else {
        match app.input_mode {
            InputMode::Message if app.show_starters() => {
                " ↑/↓ pick a suggestion │ Enter send │ Ctrl+O upload │ Esc quit "
            }
            InputMode::Message => " Enter send │ ↑/↓ PgUp/PgDn scroll │ Ctrl+O upload │ Esc quit ",
            InputMode::UploadPath => " Enter upload │ Esc cancel ",
        }
    };

    let footer = Paragraph::new(Line::from(Span::styled(
        hints,
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, area);
}

fn render_starters(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" How can I help you today? ");

    let items: Vec<ListItem> = STARTER_PROMPTS
        .iter()
        .map(|prompt| ListItem::new(format!(" {} ", prompt)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Cyan)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.starter_state);
}

fn bubble_label(kind: BubbleKind) -> Span<'static> {
    match kind {
        BubbleKind::User => Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        BubbleKind::Assistant => Span::styled(
            "Enerzal:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        BubbleKind::Notice(NoticeKind::Confirmation) => Span::styled(
            "System:",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        BubbleKind::Notice(NoticeKind::Error) => Span::styled(
            "System:",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    }
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    if app.follow {
        app.scroll = app.bottom_scroll();
    }

    let mut lines: Vec<Line> = Vec::new();
    for bubble in &app.transcript {
        lines.push(Line::from(bubble_label(bubble.kind)));
        match bubble.kind {
            BubbleKind::Assistant => {
                for line in bubble.text.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
            BubbleKind::User => {
                lines.push(Line::from(bubble.text.clone()));
            }
            BubbleKind::Notice(_) => {
                lines.push(Line::from(Span::styled(
                    bubble.text.clone(),
                    Style::default().add_modifier(Modifier::ITALIC),
                )));
            }
        }
        lines.push(Line::default());
    }

    if app.is_busy() && !app.live_reply {
        lines.push(Line::from(bubble_label(BubbleKind::Assistant)));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("typing{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_composer(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border_color) = match app.input_mode {
        _ if app.is_busy() => (" Please wait... ", Color::DarkGray),
        InputMode::Message => (" Message ", Color::Yellow),
        InputMode::UploadPath => (" File to upload (.txt, .pdf, .docx) ", Color::Magenta),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Scroll offset that keeps the cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(if app.is_busy() { Color::DarkGray } else { Color::Cyan }))
        .block(block);

    frame.render_widget(input, area);

    if !app.is_busy() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_bold_and_italic() {
        let line = parse_markdown_line("a **b** *c* `d`");
        assert_eq!(plain(&line), "a b c d");
        assert!(line.spans.iter().any(|s| s.content == "b" && s.style.add_modifier.contains(Modifier::BOLD)));
        assert!(line.spans.iter().any(|s| s.content == "c" && s.style.add_modifier.contains(Modifier::ITALIC)));
    }

    #[test]
    fn test_unclosed_marker_is_literal() {
        assert_eq!(plain(&parse_markdown_line("half **typed")), "half **typed");
        assert_eq!(plain(&parse_markdown_line("2 * 3")), "2 * 3");
    }

    #[test]
    fn test_heading_and_bullet() {
        assert_eq!(plain(&parse_markdown_line("## Leave policy")), "Leave policy");
        assert_eq!(plain(&parse_markdown_line("- item")), "• item");
    }

    #[test]
    fn test_hash_without_space_is_not_heading() {
        let line = parse_markdown_line("#channel-name");
        assert_eq!(plain(&line), "#channel-name");
        assert!(line.spans.iter().all(|s| !s.style.add_modifier.contains(Modifier::BOLD)));

        assert_eq!(plain(&parse_markdown_line("####### seven")), "####### seven");
        assert_eq!(plain(&parse_markdown_line("###")), "");
    }
}
