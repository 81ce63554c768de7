pub mod config;
pub mod events;
pub mod message;

pub use config::{RagConfig, SessionConfig};
pub use events::{ErrorCode, TurnEvent};
pub use message::{HistoryEntry, Role};
