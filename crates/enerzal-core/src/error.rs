use thiserror::Error;

/// Everything a single chat, upload, or auth operation can fail with.
///
/// Operations catch these at their boundary and turn them into one
/// user-visible message; they are never retried.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Network unreachable, timeout, or a non-success status.
    #[error("request failed: {0}")]
    Transport(String),

    /// Malformed JSON or a body that is not valid UTF-8.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The backend answered but reported a failure message.
    #[error("{0}")]
    Server(String),

    /// Missing or invalid input caught before any request was made.
    #[error("{0}")]
    Validation(String),

    /// Another operation still holds the input gate.
    #[error("another request is still in flight")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChatError::Decode(err.to_string())
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
