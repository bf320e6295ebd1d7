use std::path::PathBuf;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use enerzal_core::session::CHAT_ERROR_MESSAGE;
use enerzal_core::{
    BackendClient, ChatError, ChatSession, Config, InputGate, NoticeKind, Outcome, RenderFrame,
    RenderSink,
};

/// Suggestions offered before the first message
pub const STARTER_PROMPTS: [&str; 4] = [
    "What is the leave policy for this year?",
    "How do I reset my company email password?",
    "Are there any company events coming up?",
    "Can you summarize a document I upload?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Message,
    UploadPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    User,
    Assistant,
    Notice(NoticeKind),
}

#[derive(Debug, Clone)]
pub struct Bubble {
    pub kind: BubbleKind,
    pub text: String,
}

/// What the running operation asks the UI to show
#[derive(Debug)]
pub enum SessionUpdate {
    Paint(String),
    Notice(NoticeKind, String),
}

/// Forwards renderer output from the operation task to the UI loop
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        Self { tx }
    }
}

impl RenderSink for ChannelSink {
    fn paint(&mut self, frame: RenderFrame<'_>) {
        // The terminal styles raw Markdown itself; the HTML is for markup surfaces
        let _ = self.tx.send(SessionUpdate::Paint(frame.text.to_string()));
    }

    fn notice(&mut self, kind: NoticeKind, text: &str) {
        let _ = self.tx.send(SessionUpdate::Notice(kind, text.to_string()));
    }
}

type SessionTask = JoinHandle<(ChatSession, Outcome)>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Composer
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars
    pub starter_state: ListState,

    // Transcript
    pub transcript: Vec<Bubble>,
    pub live_reply: bool, // last bubble is a reply still being typed
    pub scroll: u16,
    pub follow: bool, // keep the newest text in view
    pub chat_height: u16,
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Operation in flight
    session: Option<ChatSession>,
    gate: InputGate,
    task: Option<SessionTask>,
    updates: mpsc::UnboundedSender<SessionUpdate>,

    // Used to rebuild the session if an operation task dies
    backend: BackendClient,
    pub config: Config,
}

impl App {
    pub fn new(backend: BackendClient, config: Config, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        let session = ChatSession::from_backend(backend.clone(), &config);
        let gate = session.gate();

        let mut starter_state = ListState::default();
        starter_state.select(Some(0));

        Self {
            should_quit: false,
            input_mode: InputMode::Message,

            input: String::new(),
            cursor: 0,
            starter_state,

            transcript: Vec::new(),
            live_reply: false,
            scroll: 0,
            follow: true,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            session: Some(session),
            gate,
            task: None,
            updates,

            backend,
            config,
        }
    }

    /// Input is refused while a chat or upload is in flight
    pub fn is_busy(&self) -> bool {
        self.task.is_some() || !self.gate.is_open()
    }

    pub fn show_starters(&self) -> bool {
        self.transcript.is_empty() && !self.is_busy()
    }

    pub fn selected_starter(&self) -> Option<&'static str> {
        self.starter_state.selected().and_then(|i| STARTER_PROMPTS.get(i).copied())
    }

    pub fn starter_nav_down(&mut self) {
        let i = self.starter_state.selected().map_or(0, |i| (i + 1) % STARTER_PROMPTS.len());
        self.starter_state.select(Some(i));
    }

    pub fn starter_nav_up(&mut self) {
        let i = self
            .starter_state
            .selected()
            .map_or(0, |i| (i + STARTER_PROMPTS.len() - 1) % STARTER_PROMPTS.len());
        self.starter_state.select(Some(i));
    }

    fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input).trim().to_string()
    }

    /// Send the composer text, or the highlighted starter when the composer is empty
    pub fn submit_message(&mut self) {
        if self.is_busy() {
            return;
        }
        let mut message = self.take_input();
        if message.is_empty() && self.transcript.is_empty() {
            message = self.selected_starter().unwrap_or_default().to_string();
        }
        if message.is_empty() {
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };

        self.transcript.push(Bubble {
            kind: BubbleKind::User,
            text: message.clone(),
        });
        self.follow = true;

        let mut sink = ChannelSink::new(self.updates.clone());
        self.task = Some(tokio::spawn(async move {
            let outcome = session.send_message(&mut sink, &message).await;
            (session, outcome)
        }));
    }

    pub fn begin_upload(&mut self) {
        if !self.is_busy() {
            self.input_mode = InputMode::UploadPath;
            self.input.clear();
            self.cursor = 0;
        }
    }

    pub fn cancel_upload(&mut self) {
        self.input_mode = InputMode::Message;
        self.input.clear();
        self.cursor = 0;
    }

    /// Upload the file whose path is in the composer
    pub fn submit_upload(&mut self) {
        if self.is_busy() {
            return;
        }
        let raw = self.take_input();
        self.input_mode = InputMode::Message;

        // Terminals often quote dragged-in paths
        let path = PathBuf::from(raw.trim_matches(|c| c == '\'' || c == '"'));
        if path.as_os_str().is_empty() {
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.follow = true;

        let mut sink = ChannelSink::new(self.updates.clone());
        self.task = Some(tokio::spawn(async move {
            let outcome = session.upload_path(&mut sink, &path).await;
            (session, outcome)
        }));
    }

    pub fn apply_update(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Paint(text) => {
                match self.transcript.last_mut() {
                    Some(bubble) if self.live_reply => bubble.text = text,
                    _ => {
                        self.transcript.push(Bubble {
                            kind: BubbleKind::Assistant,
                            text,
                        });
                        self.live_reply = true;
                    }
                }
            }
            SessionUpdate::Notice(kind, text) => {
                let bubble = Bubble {
                    kind: BubbleKind::Notice(kind),
                    text,
                };
                // An error replaces the reply it interrupted
                if self.live_reply && kind == NoticeKind::Error {
                    self.transcript.pop();
                }
                self.transcript.push(bubble);
                self.live_reply = false;
            }
        }
    }

    /// Hand the session back once its operation has finished.
    ///
    /// Everything the task sent happened before it finished, so draining
    /// `updates` here catches the final paint or notice before the live
    /// reply is closed.
    pub async fn poll_task(&mut self, updates: &mut mpsc::UnboundedReceiver<SessionUpdate>) {
        if !self.task.as_ref().is_some_and(|t| t.is_finished()) {
            return;
        }
        let Some(task) = self.task.take() else {
            return;
        };
        while let Ok(update) = updates.try_recv() {
            self.apply_update(update);
        }
        self.live_reply = false;

        match task.await {
            Ok((session, outcome)) => {
                if let Outcome::Failed(ChatError::Busy) = outcome {
                    tracing::warn!("operation rejected: input gate was closed");
                }
                self.session = Some(session);
            }
            Err(err) => {
                tracing::error!(error = %err, "operation task failed; starting a new conversation");
                let session = ChatSession::from_backend(self.backend.clone(), &self.config);
                self.gate = session.gate();
                self.session = Some(session);
                self.apply_update(SessionUpdate::Notice(NoticeKind::Error, CHAT_ERROR_MESSAGE.to_string()));
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines);
        let bottom = self.bottom_scroll();
        if self.scroll >= bottom {
            self.scroll = bottom;
            self.follow = true;
        }
    }

    /// Estimated wrapped height of the transcript
    pub fn transcript_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for bubble in &self.transcript {
            total_lines = total_lines.saturating_add(1); // Label line
            for line in bubble.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count.div_ceil(wrap_width) };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after bubble
        }

        if self.is_busy() && !self.live_reply {
            total_lines = total_lines.saturating_add(2); // Label + "typing..."
        }
        total_lines
    }

    pub fn bottom_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.transcript_lines().saturating_sub(visible_height)
    }
}
