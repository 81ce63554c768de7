pub mod client;
pub mod error;
pub mod streaming;
pub mod traits;
pub mod types;

pub use client::OpenAiCompatClient;
pub use error::LlmError;
pub use streaming::{collect_stream, ChatStream, StreamEvent};
pub use traits::{CallStats, ChatClient, ChatRequest, ChatResponse, TokenUsage};
pub use types::{format_messages, Message};
