pub mod auth;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod render;
pub mod session;
pub mod state;
pub mod token;
pub mod upload;

// Re-export main types for convenience
pub use auth::{AuthClient, SignupOutcome};
pub use backend::BackendClient;
pub use config::Config;
pub use conversation::ConversationBuffer;
pub use dispatch::{ChatReply, ChatRequest, ChatTransport, ResponseMode};
pub use error::ChatError;
pub use render::{markdown_to_html, NoticeKind, RenderFrame, RenderSink, Renderer};
pub use session::{ChatSession, InputGate, Outcome};
pub use state::{ChatRole, Turn};
pub use token::TokenStore;
pub use upload::UploadFile;
