use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;

/// One decoded frame of the expert event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpertFrame {
    /// A piece of the answer.
    Content(String),
    /// Normal termination.
    Done,
    /// Upstream reported a failure.
    Error(String),
}

#[derive(Debug, Error)]
pub enum SseError {
    #[error("expert stream failed: {0}")]
    Transport(String),
}

/// Decode the payload of one `data: ` line.
///
/// Recognized JSON shapes: `{content}`, `{done: true}`, `{error}`. A
/// payload that is not valid JSON is treated as a raw content chunk.
pub fn parse_data_payload(payload: &str) -> Option<ExpertFrame> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => {
            if let Some(error) = map.get("error").and_then(Value::as_str) {
                return Some(ExpertFrame::Error(error.to_string()));
            }
            if map.get("done").and_then(Value::as_bool) == Some(true) {
                return Some(ExpertFrame::Done);
            }
            map.get("content")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(|c| ExpertFrame::Content(c.to_string()))
        }
        Ok(_) => {
            // Valid JSON of another shape carries nothing we recognize.
            None
        }
        Err(_) => {
            let raw = payload.trim();
            if raw.is_empty() {
                None
            } else {
                Some(ExpertFrame::Content(raw.to_string()))
            }
        }
    }
}

/// Pump a byte stream through the SSE line discipline, yielding decoded
/// frames. `event: ` lines are recognized but non-authoritative; decoding
/// stays data-driven.
pub fn parse_expert_stream<S, E>(
    stream: S,
) -> impl Stream<Item = Result<ExpertFrame, SseError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    async_stream::stream! {
        let mut byte_chunks = Box::pin(stream);
        let mut buffer: VecDeque<u8> = VecDeque::with_capacity(8192);

        'read: while let Some(chunk_result) = byte_chunks.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(SseError::Transport(e.to_string()));
                    break 'read;
                }
            };
            buffer.extend(bytes);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let Ok(line_str) = std::str::from_utf8(&line_bytes) else {
                    continue;
                };
                let line = line_str.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(payload) = line.strip_prefix("data: ") {
                    if let Some(frame) = parse_data_payload(payload) {
                        let terminal = !matches!(frame, ExpertFrame::Content(_));
                        yield Ok(frame);
                        if terminal {
                            break 'read;
                        }
                    }
                } else if let Some(event) = line.strip_prefix("event: ") {
                    tracing::debug!(event, "expert SSE event line");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_payload_is_appended() {
        assert_eq!(
            parse_data_payload(r#"{"content":"ammonia is stable"}"#),
            Some(ExpertFrame::Content("ammonia is stable".to_string()))
        );
    }

    #[test]
    fn done_payload_terminates() {
        assert_eq!(parse_data_payload(r#"{"done":true}"#), Some(ExpertFrame::Done));
        assert_eq!(parse_data_payload(r#"{"done":false}"#), None);
    }

    #[test]
    fn error_payload_wins_over_content() {
        assert_eq!(
            parse_data_payload(r#"{"error":"collection missing","content":"x"}"#),
            Some(ExpertFrame::Error("collection missing".to_string()))
        );
    }

    #[test]
    fn non_json_payload_is_raw_content() {
        assert_eq!(
            parse_data_payload("plain text answer"),
            Some(ExpertFrame::Content("plain text answer".to_string()))
        );
    }

    #[test]
    fn empty_content_is_skipped() {
        assert_eq!(parse_data_payload(r#"{"content":""}"#), None);
        assert_eq!(parse_data_payload("   "), None);
    }
}
