use crate::error::Result;
use crate::models::{ChatMessage, NewMessage};
use chrono::{SubsecRound, Utc};
use kaiwa_types::{HistoryEntry, Role};
use sqlx::MySqlPool;
use uuid::Uuid;

/// Window handed to the pipeline when no explicit limit is given.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;

const SELECT_COLUMNS: &str = "id, session_id, role, content, `type`, status, message_id, \
     tool_calls, meta_data, `timestamp`, updated_at";

/// Reads and writes `chat_history` rows.
#[derive(Clone)]
pub struct HistoryRepository {
    pool: MySqlPool,
}

impl HistoryRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Durably append one message. A fresh `message_id` is assigned when
    /// the caller did not supply one; `timestamp` is event time at second
    /// precision.
    pub async fn append(&self, message: NewMessage) -> Result<ChatMessage> {
        let message_id = message
            .message_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = Utc::now().trunc_subsecs(0);
        let meta_data = message
            .meta_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "INSERT INTO chat_history \
             (session_id, role, content, `type`, message_id, meta_data, `timestamp`, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.message_type)
        .bind(&message_id)
        .bind(&meta_data)
        .bind(timestamp)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            session_id = %message.session_id,
            role = %message.role,
            message_id = %message_id,
            "appended chat message"
        );

        Ok(ChatMessage {
            id: result.last_insert_id() as i64,
            session_id: message.session_id,
            role: message.role.as_str().to_string(),
            content: message.content,
            message_type: message.message_type,
            status: None,
            message_id,
            tool_calls: None,
            meta_data,
            timestamp,
            updated_at: timestamp,
        })
    }

    /// Most recent `limit` rows in ascending time order. An unknown
    /// session yields an empty list, never an error.
    pub async fn recent(&self, session_id: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM chat_history WHERE session_id = ? \
             ORDER BY `timestamp` DESC, id DESC LIMIT ?"
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        messages.reverse();
        Ok(messages)
    }

    /// Remove every row of the session; returns the count removed.
    pub async fn clear(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_history WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            session_id,
            deleted = result.rows_affected(),
            "cleared chat history"
        );
        Ok(result.rows_affected())
    }
}

/// Strip stored rows down to the `{role, content}` window the LLM sees.
/// Order is preserved; rows with empty content are dropped.
pub fn format_for_llm(messages: &[ChatMessage]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| HistoryEntry {
            role: Role::parse(&m.role),
            content: m.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: 1,
            session_id: "s".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            message_type: None,
            status: None,
            message_id: "m".to_string(),
            tool_calls: None,
            meta_data: None,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn format_for_llm_strips_metadata_and_empty_rows() {
        let rows = vec![row("user", "feed log?"), row("assistant", ""), row("assistant", "here")];
        let window = format_for_llm(&rows);

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
        assert_eq!(window[1].content, "here");
    }
}
