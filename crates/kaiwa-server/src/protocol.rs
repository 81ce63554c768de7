//! Wire frames: JSON envelopes `{type, data}` in both directions.

use kaiwa_types::{ErrorCode, SessionConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Frames accepted from clients, after legacy coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Init {
        session_id: Option<String>,
        user_id: String,
    },
    Ping,
    UserMessage(UserMessage),
    UpdateConfig {
        session_id: Option<String>,
        patch: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    pub content: String,
    pub session_id: Option<String>,
    pub context: Option<Value>,
    /// Explicit message type from the client, defaults to "text".
    pub message_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame must be a JSON object with a 'type' field")]
    Malformed,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unknown frame type '{0}'")]
    UnknownType(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Map<String, Value>,
    // Legacy flat form carries these at the top level.
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

fn string_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse one inbound text frame.
///
/// The legacy flat shape (`{message, session_id?, context?}`, no `type`)
/// is coerced to `UserMessage` here so it never leaks further in.
pub fn parse_inbound(text: &str) -> Result<InboundFrame, ProtocolError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|_| ProtocolError::Malformed)?;

    match raw.kind.as_deref() {
        Some("ping") => Ok(InboundFrame::Ping),
        Some("init") => Ok(InboundFrame::Init {
            session_id: string_field(&raw.data, "session_id"),
            user_id: string_field(&raw.data, "user_id")
                .unwrap_or_else(|| "default_user".to_string()),
        }),
        Some("userSendMessage") => {
            let content = string_field(&raw.data, "content")
                .or_else(|| string_field(&raw.data, "message"))
                .or_else(|| raw.message.filter(|s| !s.trim().is_empty()))
                .ok_or(ProtocolError::MissingField("content"))?;
            Ok(InboundFrame::UserMessage(UserMessage {
                content,
                session_id: string_field(&raw.data, "session_id").or(raw.session_id),
                context: raw.data.get("context").cloned().or(raw.context),
                message_type: string_field(&raw.data, "type"),
            }))
        }
        Some("updateConfig") => {
            let patch = raw
                .data
                .get("config")
                .cloned()
                .ok_or(ProtocolError::MissingField("config"))?;
            Ok(InboundFrame::UpdateConfig {
                session_id: string_field(&raw.data, "session_id").or(raw.session_id),
                patch,
            })
        }
        Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
        None => {
            // Legacy flat form.
            let content = raw
                .message
                .or_else(|| string_field(&raw.data, "message"))
                .filter(|s| !s.trim().is_empty())
                .ok_or(ProtocolError::Malformed)?;
            Ok(InboundFrame::UserMessage(UserMessage {
                content,
                session_id: raw.session_id,
                context: raw.context,
                message_type: None,
            }))
        }
    }
}

/// Frames sent to clients. Serializes to `{"type": ..., "data": {...}}`;
/// `pong` carries no payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum OutboundFrame {
    #[serde(rename = "init")]
    Init {
        session_id: String,
        messages: Vec<Value>,
        config: SessionConfig,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "newChatMessage")]
    NewChatMessage {
        session_id: String,
        content: String,
        message_id: String,
        role: String,
        timestamp: i64,
        #[serde(rename = "type")]
        message_type: String,
    },
    #[serde(rename = "stream_chunk")]
    StreamChunk {
        session_id: String,
        content: String,
        event: String,
        message_id: String,
        role: String,
        timestamp: i64,
        #[serde(rename = "type")]
        message_type: String,
    },
    #[serde(rename = "updateConfig_ack")]
    UpdateConfigAck {
        session_id: String,
        config: SessionConfig,
    },
    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
    #[serde(rename = "done")]
    Done {
        session_id: String,
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
}

impl OutboundFrame {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        OutboundFrame::Error {
            code,
            message: message.into(),
        }
    }

    /// Echo of a received user message.
    pub fn user_echo(
        session_id: impl Into<String>,
        content: impl Into<String>,
        message_id: impl Into<String>,
        timestamp: i64,
        message_type: Option<&str>,
    ) -> Self {
        OutboundFrame::NewChatMessage {
            session_id: session_id.into(),
            content: content.into(),
            message_id: message_id.into(),
            role: "user".to_string(),
            timestamp,
            message_type: message_type.unwrap_or("text").to_string(),
        }
    }

    /// One incremental assistant chunk; `content` is the chunk alone.
    pub fn stream_chunk(
        session_id: impl Into<String>,
        content: impl Into<String>,
        message_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        OutboundFrame::StreamChunk {
            session_id: session_id.into(),
            content: content.into(),
            event: "content".to_string(),
            message_id: message_id.into(),
            role: "assistant".to_string(),
            timestamp,
            message_type: "stream_chunk".to_string(),
        }
    }

    pub fn done(
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        warning: Option<String>,
    ) -> Self {
        OutboundFrame::Done {
            session_id: session_id.into(),
            message_id: message_id.into(),
            meta: warning.map(|w| serde_json::json!({ "warning": w })),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":{"code":"internal","message":"serialization failed"}}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_init_frame() {
        let frame =
            parse_inbound(r#"{"type":"init","data":{"session_id":"s1","user_id":"u1"}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Init {
                session_id: Some("s1".to_string()),
                user_id: "u1".to_string(),
            }
        );
    }

    #[test]
    fn init_without_session_defaults_user() {
        let frame = parse_inbound(r#"{"type":"init","data":{}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Init {
                session_id: None,
                user_id: "default_user".to_string(),
            }
        );
    }

    #[test]
    fn parses_ping_without_payload() {
        assert_eq!(parse_inbound(r#"{"type":"ping"}"#).unwrap(), InboundFrame::Ping);
    }

    #[test]
    fn parses_user_send_message() {
        let frame = parse_inbound(
            r#"{"type":"userSendMessage","data":{"content":"hello","context":{"pond":3}}}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::UserMessage(msg) => {
                assert_eq!(msg.content, "hello");
                assert_eq!(msg.context, Some(json!({"pond": 3})));
            }
            other => panic!("expected UserMessage, got {other:?}"),
        }
    }

    #[test]
    fn legacy_flat_frame_is_coerced() {
        let frame = parse_inbound(r#"{"message":"hi","session_id":"s9"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::UserMessage(UserMessage {
                content: "hi".to_string(),
                session_id: Some("s9".to_string()),
                context: None,
                message_type: None,
            })
        );
    }

    #[test]
    fn missing_content_is_a_validation_error() {
        let err = parse_inbound(r#"{"type":"userSendMessage","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("content")));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_inbound(r#"{"type":"getSessionTopic"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_inbound("not json"),
            Err(ProtocolError::Malformed)
        ));
        assert!(matches!(
            parse_inbound(r#"{"session_id":"s"}"#),
            Err(ProtocolError::Malformed)
        ));
    }

    #[test]
    fn pong_serializes_without_data() {
        let json: Value = serde_json::from_str(&OutboundFrame::Pong.to_json()).unwrap();
        assert_eq!(json, json!({"type":"pong"}));
    }

    #[test]
    fn stream_chunk_frame_has_the_normative_layout() {
        let frame = OutboundFrame::stream_chunk("s1", "tok", "m1", 1_700_000_000);
        let json: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "stream_chunk");
        assert_eq!(json["data"]["content"], "tok");
        assert_eq!(json["data"]["event"], "content");
        assert_eq!(json["data"]["role"], "assistant");
        assert_eq!(json["data"]["type"], "stream_chunk");
        assert_eq!(json["data"]["message_id"], "m1");
    }

    #[test]
    fn error_frame_uses_closed_code_set() {
        let frame = OutboundFrame::error(ErrorCode::NotInitialized, "init first");
        let json: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["data"]["code"], "not_initialized");
    }

    #[test]
    fn done_frame_carries_warning_meta_only_when_present() {
        let clean: Value =
            serde_json::from_str(&OutboundFrame::done("s", "m", None).to_json()).unwrap();
        assert!(clean["data"].get("meta").is_none());

        let warned: Value = serde_json::from_str(
            &OutboundFrame::done("s", "m", Some("not persisted".to_string())).to_json(),
        )
        .unwrap();
        assert_eq!(warned["data"]["meta"]["warning"], "not persisted");
    }
}
