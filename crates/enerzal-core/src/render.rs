//! Incremental Markdown rendering of assistant replies
//!
//! Every update re-renders the whole accumulated text. Half-finished Markdown
//! (an unclosed `**`, a code fence still open) can look wrong mid-reply and
//! settles once the text is complete.

use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt};
use pulldown_cmark::{html, Options, Parser};

use crate::error::Result;

/// Delay between revealed characters in whole-response mode
pub const DEFAULT_TYPING_DELAY: Duration = Duration::from_millis(20);

/// Open-ended sequence of decoded text chunks
pub type TextStream = BoxStream<'static, Result<String>>;

/// Snapshot handed to a sink after each reveal
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    /// Raw Markdown revealed so far
    pub text: &'a str,
    /// `text` rendered to HTML
    pub html: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    Confirmation,
}

/// Display surface for one conversation.
///
/// `paint` replaces the in-progress assistant reply with a newer frame.
/// `notice` shows a system bubble; an error notice stands in for the
/// assistant reply it interrupted.
pub trait RenderSink: Send {
    fn paint(&mut self, frame: RenderFrame<'_>);

    fn notice(&mut self, kind: NoticeKind, text: &str);
}

/// Accumulated text and its latest HTML for a single reply
#[derive(Debug, Default)]
pub struct RenderState {
    text: String,
    html: String,
}

impl RenderState {
    pub fn push_str(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.html = markdown_to_html(&self.text);
    }

    pub fn frame(&self) -> RenderFrame<'_> {
        RenderFrame {
            text: &self.text,
            html: &self.html,
        }
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    typing_delay: Duration,
}

impl Renderer {
    pub fn new(typing_delay: Duration) -> Self {
        Self { typing_delay }
    }

    pub fn typing_delay(&self) -> Duration {
        self.typing_delay
    }

    /// Type out `full_text` one character at a time.
    ///
    /// Paints once per character and waits `typing_delay` after each paint,
    /// so an `n`-character reply produces exactly `n` frames and `n` waits.
    /// Runs to completion; there is no cancellation.
    pub async fn render_incremental<S>(&self, sink: &mut S, full_text: &str)
    where
        S: RenderSink + ?Sized,
    {
        let mut state = RenderState::default();
        let mut scratch = [0u8; 4];

        for ch in full_text.chars() {
            state.push_str(ch.encode_utf8(&mut scratch));
            sink.paint(state.frame());
            if !self.typing_delay.is_zero() {
                tokio::time::sleep(self.typing_delay).await;
            }
        }
    }

    /// Paint each chunk as it arrives and return the concatenated text.
    pub async fn render_stream<S>(&self, sink: &mut S, mut stream: TextStream) -> Result<String>
    where
        S: RenderSink + ?Sized,
    {
        let mut state = RenderState::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            state.push_str(&chunk);
            sink.paint(state.frame());
        }

        Ok(state.into_text())
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_DELAY)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ChatError;
    use futures_util::stream;

    /// Sink that records everything it was asked to show
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub frames: Vec<(String, String)>,
        pub notices: Vec<(NoticeKind, String)>,
    }

    impl RenderSink for RecordingSink {
        fn paint(&mut self, frame: RenderFrame<'_>) {
            self.frames.push((frame.text.to_string(), frame.html.to_string()));
        }

        fn notice(&mut self, kind: NoticeKind, text: &str) {
            self.notices.push((kind, text.to_string()));
        }
    }

    #[test]
    fn test_markdown_to_html() {
        assert_eq!(markdown_to_html("**hi**"), "<p><strong>hi</strong></p>\n");
        assert_eq!(markdown_to_html(""), "");
    }

    #[test]
    fn test_partial_markdown_resolves_when_complete() {
        let partial = markdown_to_html("**bo");
        assert!(!partial.contains("<strong>"));
        let complete = markdown_to_html("**bold**");
        assert!(complete.contains("<strong>bold</strong>"));
    }

    #[tokio::test]
    async fn test_character_paced_paints_once_per_char() {
        let renderer = Renderer::new(Duration::ZERO);
        let mut sink = RecordingSink::default();
        renderer.render_incremental(&mut sink, "Hello").await;

        assert_eq!(sink.frames.len(), 5);
        let texts: Vec<&str> = sink.frames.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["H", "He", "Hel", "Hell", "Hello"]);
        assert_eq!(sink.frames[4].1, "<p>Hello</p>\n");
    }

    #[tokio::test]
    async fn test_character_paced_counts_chars_not_bytes() {
        let renderer = Renderer::new(Duration::ZERO);
        let mut sink = RecordingSink::default();
        renderer.render_incremental(&mut sink, "héllo").await;
        assert_eq!(sink.frames.len(), 5);
    }

    #[tokio::test]
    async fn test_character_paced_empty_text_paints_nothing() {
        let renderer = Renderer::new(Duration::ZERO);
        let mut sink = RecordingSink::default();
        renderer.render_incremental(&mut sink, "").await;
        assert!(sink.frames.is_empty());
    }

    #[tokio::test]
    async fn test_character_paced_honours_delay() {
        let renderer = Renderer::new(Duration::from_millis(2));
        let mut sink = RecordingSink::default();
        let started = std::time::Instant::now();
        renderer.render_incremental(&mut sink, "abcd").await;
        // one wait per character, including the last
        assert!(started.elapsed() >= Duration::from_millis(8));
        assert_eq!(sink.frames.len(), 4);
    }

    #[tokio::test]
    async fn test_stream_concatenates_chunks() {
        let renderer = Renderer::default();
        let mut sink = RecordingSink::default();
        let chunks = stream::iter(vec![Ok("He".to_string()), Ok("llo".to_string())]).boxed();

        let text = renderer.render_stream(&mut sink, chunks).await.unwrap();
        assert_eq!(text, "Hello");
        let texts: Vec<&str> = sink.frames.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["He", "Hello"]);
    }

    #[tokio::test]
    async fn test_stream_error_aborts() {
        let renderer = Renderer::default();
        let mut sink = RecordingSink::default();
        let chunks = stream::iter(vec![
            Ok("par".to_string()),
            Err(ChatError::Transport("connection reset".into())),
        ])
        .boxed();

        let result = renderer.render_stream(&mut sink, chunks).await;
        assert!(matches!(result, Err(ChatError::Transport(_))));
        assert_eq!(sink.frames.len(), 1);
    }
}
