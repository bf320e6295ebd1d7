use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::render::TextStream;
use crate::state::Turn;

/// Reply shown when the backend sends neither `content` nor `error`
pub const FALLBACK_REPLY: &str = "Sorry, I did not understand that.";

/// How the chat endpoint delivers its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// One JSON object, typed out character by character
    #[default]
    Whole,
    /// Raw text chunks, painted as they arrive
    Stream,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Whole => "whole",
            ResponseMode::Stream => "stream",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "whole" => Some(ResponseMode::Whole),
            "stream" | "streaming" => Some(ResponseMode::Stream),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Turn>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<Turn>, mode: ResponseMode) -> Self {
        Self {
            messages,
            stream: mode == ResponseMode::Stream,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponseBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponseBody {
    /// Text to show as the assistant reply
    pub fn into_message(self) -> String {
        match (self.content, self.error) {
            (Some(content), _) if !content.is_empty() => content,
            (_, Some(error)) if !error.is_empty() => format!("Error: {}", error),
            _ => FALLBACK_REPLY.to_string(),
        }
    }
}

pub enum ChatReply {
    Whole(ChatResponseBody),
    Stream(TextStream),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Whole(body) => f.debug_tuple("Whole").field(body).finish(),
            ChatReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Anything that can carry one chat request to the backend
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply>;
}

/// Incremental UTF-8 decoder that holds back a character split across chunks
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => return Err(ChatError::Decode(err.to_string())),
        };

        let tail = self.pending.split_off(valid);
        let ready = std::mem::replace(&mut self.pending, tail);
        String::from_utf8(ready).map_err(|e| ChatError::Decode(e.to_string()))
    }

    fn finish(&self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(ChatError::Decode("response ended in the middle of a character".into()))
        }
    }
}

/// Turn a raw byte stream into text chunks.
///
/// Ends after the first error.
pub fn decode_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ChatError> + Send,
{
    let state = (Box::pin(bytes), Utf8Decoder::default(), false);

    stream::unfold(state, |(mut inner, mut decoder, finished)| async move {
        if finished {
            return None;
        }
        loop {
            match inner.next().await {
                Some(Ok(chunk)) => match decoder.feed(chunk.as_ref()) {
                    Ok(text) if text.is_empty() => continue,
                    Ok(text) => return Some((Ok(text), (inner, decoder, false))),
                    Err(err) => return Some((Err(err), (inner, decoder, true))),
                },
                Some(Err(err)) => return Some((Err(err.into()), (inner, decoder, true))),
                None => {
                    return match decoder.finish() {
                        Ok(()) => None,
                        Err(err) => Some((Err(err), (inner, decoder, true))),
                    };
                }
            }
        }
    })
    .boxed()
}
