mod client;
mod error;
mod history;
mod models;
mod session;
mod store;

pub use client::PersistClient;
pub use error::{PersistError, Result};
pub use history::{format_for_llm, HistoryRepository, DEFAULT_HISTORY_LIMIT};
pub use models::{ChatMessage, NewMessage, SessionRecord};
pub use session::{SessionBootstrap, SessionRepository};
pub use store::HistoryStore;
