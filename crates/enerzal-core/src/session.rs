//! One conversation and the operations a user can run against it
//!
//! `ChatSession` is the single owner of the conversation buffer. Each
//! operation holds the input gate for its whole duration, settles into an
//! [`Outcome`], and paints exactly one message on failure.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::conversation::{ConversationBuffer, DEFAULT_SYSTEM_INSTRUCTION};
use crate::dispatch::{ChatReply, ChatRequest, ChatTransport, ResponseMode};
use crate::error::{ChatError, Result};
use crate::render::{NoticeKind, RenderSink, Renderer};
use crate::upload::{
    confirmation_message, document_context_message, validate_upload, UploadFile, UploadTransport,
};

/// Shown in place of the assistant reply when a chat request fails
pub const CHAT_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again later.";

/// Shown when an upload fails for any reason
pub const UPLOAD_ERROR_MESSAGE: &str = "Sorry, there was an issue with the file upload.";

/// Open while the user may start an operation, closed while one is in flight.
///
/// Clones share state so a front end can watch it while the session is busy.
#[derive(Debug, Clone, Default)]
pub struct InputGate {
    busy: Arc<AtomicBool>,
}

impl InputGate {
    pub fn is_open(&self) -> bool {
        !self.busy.load(Ordering::Acquire)
    }

    /// Close the gate until the returned guard drops
    pub fn close(&self) -> Result<GateGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChatError::Busy)?;
        Ok(GateGuard {
            busy: Arc::clone(&self.busy),
        })
    }
}

/// Reopens the gate on drop, whichever way the operation ended
#[derive(Debug)]
pub struct GateGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// Final assistant text, or the upload confirmation
    Completed(String),
    /// Nothing was sent: blank input
    Skipped,
    /// Buffer untouched; the user has already been shown a message
    /// unless the error is [`ChatError::Busy`]
    Failed(ChatError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

pub struct ChatSession {
    buffer: ConversationBuffer,
    gate: InputGate,
    chat: Arc<dyn ChatTransport>,
    uploads: Arc<dyn UploadTransport>,
    renderer: Renderer,
    mode: ResponseMode,
}

impl ChatSession {
    pub fn new(
        buffer: ConversationBuffer,
        chat: Arc<dyn ChatTransport>,
        uploads: Arc<dyn UploadTransport>,
        renderer: Renderer,
        mode: ResponseMode,
    ) -> Self {
        Self {
            buffer,
            gate: InputGate::default(),
            chat,
            uploads,
            renderer,
            mode,
        }
    }

    pub fn from_backend(backend: BackendClient, config: &Config) -> Self {
        let backend = Arc::new(backend);
        Self::new(
            ConversationBuffer::with_instruction(DEFAULT_SYSTEM_INSTRUCTION, config.history_window),
            backend.clone(),
            backend,
            Renderer::new(config.typing_delay()),
            config.response_mode,
        )
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    pub fn gate(&self) -> InputGate {
        self.gate.clone()
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Send one user message and render the reply.
    ///
    /// On success the buffer gains the user turn and the final assistant
    /// text, pruned back to the window. On failure the buffer is restored to
    /// what it was before the call.
    pub async fn send_message<S>(&mut self, sink: &mut S, message: &str) -> Outcome
    where
        S: RenderSink + ?Sized,
    {
        let message = message.trim();
        if message.is_empty() {
            return Outcome::Skipped;
        }

        let _guard = match self.gate.close() {
            Ok(guard) => guard,
            Err(err) => return Outcome::Failed(err),
        };

        let snapshot = self.buffer.clone();
        self.buffer.append_user(message);
        self.buffer.prune();

        let request = ChatRequest::new(self.buffer.to_payload(), self.mode);
        tracing::debug!(turns = request.messages.len(), mode = self.mode.as_str(), "dispatching chat");

        match self.exchange(sink, &request).await {
            Ok(reply) => {
                self.buffer.append_assistant(reply.clone());
                self.buffer.prune();
                Outcome::Completed(reply)
            }
            Err(err) => {
                tracing::warn!(error = %err, "chat request failed");
                self.buffer = snapshot;
                sink.notice(NoticeKind::Error, CHAT_ERROR_MESSAGE);
                Outcome::Failed(err)
            }
        }
    }

    async fn exchange<S>(&self, sink: &mut S, request: &ChatRequest) -> Result<String>
    where
        S: RenderSink + ?Sized,
    {
        match self.chat.send_chat(request).await? {
            ChatReply::Whole(body) => {
                let text = body.into_message();
                self.renderer.render_incremental(sink, &text).await;
                Ok(text)
            }
            ChatReply::Stream(stream) => self.renderer.render_stream(sink, stream).await,
        }
    }

    /// Read a file from disk and upload it
    pub async fn upload_path<S>(&mut self, sink: &mut S, path: &Path) -> Outcome
    where
        S: RenderSink + ?Sized,
    {
        let _guard = match self.gate.close() {
            Ok(guard) => guard,
            Err(err) => return Outcome::Failed(err),
        };

        match UploadFile::from_path(path).await {
            Ok(file) => self.finish_upload(sink, file).await,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "could not read upload");
                sink.notice(NoticeKind::Error, UPLOAD_ERROR_MESSAGE);
                Outcome::Failed(err)
            }
        }
    }

    /// Upload a document and hand its text to the model as a system turn.
    pub async fn upload_file<S>(&mut self, sink: &mut S, file: UploadFile) -> Outcome
    where
        S: RenderSink + ?Sized,
    {
        let _guard = match self.gate.close() {
            Ok(guard) => guard,
            Err(err) => return Outcome::Failed(err),
        };
        self.finish_upload(sink, file).await
    }

    // Caller holds the gate
    async fn finish_upload<S>(&mut self, sink: &mut S, file: UploadFile) -> Outcome
    where
        S: RenderSink + ?Sized,
    {
        match self.extract(&file).await {
            Ok(content) => {
                self.buffer.append_system(document_context_message(&file.file_name, &content));
                self.buffer.prune();
                tracing::info!(file = %file.file_name, chars = content.len(), "document added to conversation");

                let confirmation = confirmation_message(&file.file_name);
                sink.notice(NoticeKind::Confirmation, &confirmation);
                Outcome::Completed(confirmation)
            }
            Err(err) => {
                tracing::warn!(error = %err, file = %file.file_name, "upload failed");
                sink.notice(NoticeKind::Error, UPLOAD_ERROR_MESSAGE);
                Outcome::Failed(err)
            }
        }
    }

    async fn extract(&self, file: &UploadFile) -> Result<String> {
        validate_upload(file)?;
        self.uploads.upload(file).await?.into_content()
    }
}
