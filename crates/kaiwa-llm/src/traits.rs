use crate::error::LlmError;
use crate::streaming::ChatStream;
use crate::types::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-based LLM interactions.
///
/// One implementation talks to the real provider; tests substitute scripted
/// fakes. Both streaming and non-streaming completions share the request
/// type.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Non-streaming completion: full text plus usage in one response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Streaming completion. The concatenation of all `Message` events
    /// equals the text a non-streaming call would have returned.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LlmError>;
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Accounting for one LLM call: approximate token counts plus wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallStats {
    pub usage: Option<TokenUsage>,
    pub elapsed: Duration,
}

impl CallStats {
    pub fn new(usage: Option<TokenUsage>, elapsed: Duration) -> Self {
        Self { usage, elapsed }
    }

    /// Fold another call's accounting into this one.
    pub fn absorb(&mut self, other: CallStats) {
        self.elapsed += other.elapsed;
        match (&mut self.usage, other.usage) {
            (Some(mine), Some(theirs)) => {
                mine.prompt_tokens += theirs.prompt_tokens;
                mine.completion_tokens += theirs.completion_tokens;
                mine.total_tokens += theirs.total_tokens;
            }
            (None, Some(theirs)) => self.usage = Some(theirs),
            _ => {}
        }
    }
}
