use crate::error::Result;
use crate::history::HistoryRepository;
use crate::models::{ChatMessage, NewMessage};
use async_trait::async_trait;

/// Capability the pipeline needs from history persistence.
///
/// The MySQL repository implements it for production; orchestrator tests
/// substitute an in-memory fake.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Durable append; returns the persisted row.
    async fn append(&self, message: NewMessage) -> Result<ChatMessage>;

    /// Most recent `limit` rows, ascending time order; empty for unknown
    /// sessions.
    async fn recent(&self, session_id: &str, limit: u32) -> Result<Vec<ChatMessage>>;

    /// Delete everything for the session; returns the removed count.
    async fn clear(&self, session_id: &str) -> Result<u64>;
}

#[async_trait]
impl HistoryStore for HistoryRepository {
    async fn append(&self, message: NewMessage) -> Result<ChatMessage> {
        HistoryRepository::append(self, message).await
    }

    async fn recent(&self, session_id: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        HistoryRepository::recent(self, session_id, limit).await
    }

    async fn clear(&self, session_id: &str) -> Result<u64> {
        HistoryRepository::clear(self, session_id).await
    }
}
