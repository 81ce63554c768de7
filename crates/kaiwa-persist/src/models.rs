use chrono::{DateTime, Utc};
use kaiwa_types::Role;
use serde_json::{json, Value};
use sqlx::FromRow;

/// One row of `chat_history`.
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    #[sqlx(rename = "type")]
    pub message_type: Option<String>,
    pub status: Option<String>,
    pub message_id: String,
    pub tool_calls: Option<String>,
    pub meta_data: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    /// Wire shape used when replaying history on `init`: unix-second
    /// timestamps, decoded metadata, never-null content.
    pub fn to_wire(&self) -> Value {
        let meta_data = self
            .meta_data
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .unwrap_or_else(|| json!({}));

        json!({
            "id": self.id,
            "session_id": self.session_id,
            "role": self.role,
            "content": self.content,
            "type": self.message_type.clone().unwrap_or_default(),
            "message_id": self.message_id,
            "timestamp": self.timestamp.timestamp(),
            "meta_data": meta_data,
        })
    }
}

/// Input to `HistoryStore::append`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub message_type: Option<String>,
    /// Stable id for the message; generated when absent.
    pub message_id: Option<String>,
    pub meta_data: Option<Value>,
}

impl NewMessage {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            message_type: None,
            message_id: None,
            meta_data: None,
        }
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn meta_data(mut self, meta_data: Value) -> Self {
        self.meta_data = Some(meta_data);
        self
    }
}

/// One row of `sessions`.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub session_id: String,
    pub user_id: String,
    pub config: Option<String>,
    pub status: Option<String>,
    pub session_name: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_message() -> ChatMessage {
        ChatMessage {
            id: 7,
            session_id: "sess-1".to_string(),
            role: "assistant".to_string(),
            content: "tank 2 looks fine".to_string(),
            message_type: Some("data_query".to_string()),
            status: None,
            message_id: "m-1".to_string(),
            tool_calls: None,
            meta_data: Some(r#"{"expert_consulted":true}"#.to_string()),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn wire_shape_uses_unix_seconds_and_decoded_meta() {
        let wire = sample_message().to_wire();
        assert_eq!(wire["timestamp"], json!(1748779200));
        assert_eq!(wire["meta_data"]["expert_consulted"], json!(true));
        assert_eq!(wire["type"], json!("data_query"));
    }

    #[test]
    fn broken_meta_data_becomes_empty_object() {
        let mut message = sample_message();
        message.meta_data = Some("{oops".to_string());
        assert_eq!(message.to_wire()["meta_data"], json!({}));
    }

    #[test]
    fn role_accessor_parses_stored_string() {
        assert_eq!(sample_message().role(), Role::Assistant);
    }
}
