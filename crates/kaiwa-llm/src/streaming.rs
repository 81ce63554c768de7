use crate::error::LlmError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Incremental events of one streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// One non-empty block of assistant text.
    Message { content: String },
    /// Stream finished.
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

/// One SSE chunk of the chat-completions stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatStreamChunk {
    fn to_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(choice) = self.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Message {
                        content: content.clone(),
                    });
                }
            }
            if let Some(reason) = &choice.finish_reason {
                events.push(StreamEvent::Done {
                    finish_reason: Some(reason.clone()),
                });
            }
        }
        events
    }
}

/// Turn a live HTTP response into a stream of [`StreamEvent`]s.
pub fn parse_chat_sse_stream(response: reqwest::Response) -> ChatStream {
    parse_sse_bytes(response.bytes_stream())
}

/// Line-buffered SSE parse over any byte stream.
///
/// Generic over the byte source so tests can drive it with synthetic
/// chunks, including payloads split across chunk boundaries.
pub fn parse_sse_bytes<S, E>(stream: S) -> ChatStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(stream);
        let mut buffer: VecDeque<u8> = VecDeque::with_capacity(8192);

        'read: while let Some(chunk_result) = byte_chunks.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(LlmError::RetryableUpstream(format!("stream error: {e}")));
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

                if let Some(data) = line.strip_prefix("data: ") {
                    if data == "[DONE]" {
                        yield Ok(StreamEvent::Done { finish_reason: None });
                        break 'read;
                    }

                    match serde_json::from_str::<ChatStreamChunk>(data) {
                        Ok(chunk) => {
                            for event in chunk.to_events() {
                                let done = matches!(event, StreamEvent::Done { .. });
                                yield Ok(event);
                                if done {
                                    break 'read;
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(LlmError::InvalidResponse(format!(
                                "bad stream chunk: {e}"
                            )));
                        }
                    }
                }
            }
        }
    })
}

/// Drain a chat stream into its full text, handing every chunk to
/// `on_chunk` in emission order. Returns the concatenation, which equals
/// the text of the equivalent non-streaming call.
///
/// Observes `cancel` between chunks: on cancellation the stream is dropped
/// (closing the connection) and `Canceled` is returned; chunks already
/// delivered stay delivered.
pub async fn collect_stream<F>(
    mut stream: ChatStream,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> Result<String, LlmError>
where
    F: FnMut(&str) + Send,
{
    let mut text = String::new();
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Canceled),
            event = stream.next() => event,
        };
        match event {
            Some(Ok(StreamEvent::Message { content })) => {
                on_chunk(&content);
                text.push_str(&content);
            }
            Some(Ok(StreamEvent::Done { .. })) | None => return Ok(text),
            Some(Err(e)) => return Err(e),
        }
    }
}
