use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Paste(text) => {
            if !app.is_busy() {
                // A pasted newline would otherwise be lost; keep it single-line
                insert_str(app, &text.replace(['\r', '\n'], " "));
            }
        }
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Scrolling stays available while a reply is being typed
    let half_page = app.chat_height.max(2) / 2;
    let scrolled = match key.code {
        KeyCode::PageUp => Some(-i32::from(half_page)),
        KeyCode::PageDown => Some(i32::from(half_page)),
        KeyCode::Up if !app.show_starters() => Some(-1),
        KeyCode::Down if !app.show_starters() => Some(1),
        _ => None,
    };
    if let Some(delta) = scrolled {
        if delta < 0 {
            app.scroll_up(delta.unsigned_abs() as u16);
        } else {
            app.scroll_down(delta as u16);
        }
        return;
    }

    if app.is_busy() {
        return;
    }

    match app.input_mode {
        InputMode::Message => handle_message_mode(app, key),
        InputMode::UploadPath => handle_upload_mode(app, key),
    }
}

fn handle_message_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc if app.input.is_empty() => app.should_quit = true,
        KeyCode::Esc => {
            app.input.clear();
            app.cursor = 0;
        }
        KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => app.begin_upload(),
        KeyCode::Enter => app.submit_message(),
        KeyCode::Up => app.starter_nav_up(),
        KeyCode::Down => app.starter_nav_down(),
        _ => edit_input(app, key),
    }
}

fn handle_upload_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_upload(),
        KeyCode::Enter => app.submit_upload(),
        _ => edit_input(app, key),
    }
}

fn insert_str(app: &mut App, text: &str) {
    let byte_pos = char_to_byte_index(&app.input, app.cursor);
    app.input.insert_str(byte_pos, text);
    app.cursor += text.chars().count();
}

fn edit_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;
    use enerzal_core::{BackendClient, Config};
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(BackendClient::new("http://127.0.0.1:9"), Config::new(), tx)
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }

    #[tokio::test]
    async fn test_editing_respects_cursor() {
        let mut app = app();
        for c in "hllo".chars() {
            handle_event(&mut app, key(KeyCode::Char(c))).await.unwrap();
        }
        handle_event(&mut app, key(KeyCode::Home)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Right)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Char('e'))).await.unwrap();
        assert_eq!(app.input, "hello");

        handle_event(&mut app, key(KeyCode::End)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Backspace)).await.unwrap();
        assert_eq!(app.input, "hell");
        assert_eq!(app.cursor, 4);
    }

    #[tokio::test]
    async fn test_upload_mode_toggles() {
        let mut app = app();
        let ctrl_o = AppEvent::Key(KeyEvent::new(KeyCode::Char('o'), KeyModifiers::CONTROL));
        handle_event(&mut app, ctrl_o).await.unwrap();
        assert_eq!(app.input_mode, InputMode::UploadPath);
        assert!(app.input.is_empty());

        handle_event(&mut app, key(KeyCode::Esc)).await.unwrap();
        assert_eq!(app.input_mode, InputMode::Message);
        assert!(!app.should_quit);
    }

    #[tokio::test]
    async fn test_paste_is_single_line() {
        let mut app = app();
        handle_event(&mut app, AppEvent::Paste("a\nb".into())).await.unwrap();
        assert_eq!(app.input, "a b");
    }

    #[tokio::test]
    async fn test_ctrl_c_quits() {
        let mut app = app();
        let mut event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        event.kind = KeyEventKind::Press;
        handle_event(&mut app, AppEvent::Key(event)).await.unwrap();
        assert!(app.should_quit);
    }
}
