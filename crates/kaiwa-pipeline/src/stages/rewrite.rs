use crate::prompts;
use crate::stages::StageContext;
use chrono::Utc;
use kaiwa_llm::{format_messages, CallStats, ChatRequest, LlmError};
use kaiwa_types::{HistoryEntry, Role};
use serde_json::Value;
use std::time::Instant;

const REWRITE_TEMPERATURE: f32 = 0.3;
/// Only the tail of the window matters for resolving references.
const REWRITE_HISTORY_WINDOW: usize = 6;

/// Rewrite a follow-up question into a self-contained query.
///
/// Deterministic on empty history: the input is returned unchanged without
/// an LLM call. An empty or degenerate rewrite also falls back to the
/// original question.
pub async fn rewrite_query(
    ctx: &StageContext<'_>,
    query: &str,
    history: &[HistoryEntry],
    context: Option<&Value>,
) -> Result<(String, CallStats), LlmError> {
    if history.is_empty() {
        return Ok((query.to_string(), CallStats::default()));
    }

    let started = Instant::now();

    let tail = &history[history.len().saturating_sub(REWRITE_HISTORY_WINDOW)..];
    let history_block = tail
        .iter()
        .map(|entry| match entry.role {
            Role::Assistant => format!("Assistant: {}", entry.content),
            _ => format!("User: {}", entry.content),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let context_block = context
        .map(|c| format!("\nAdditional context: {c}"))
        .unwrap_or_default();

    let system = prompts::rewrite_system(Utc::now());
    let user = prompts::rewrite_user(&history_block, &context_block, query);
    let request = ChatRequest::new(ctx.model, format_messages(&system, &[], &user))
        .temperature(REWRITE_TEMPERATURE)
        .max_tokens(ctx.max_tokens);

    let response = ctx.llm.chat(request).await?;
    let rewritten = response
        .content
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    let rewritten = if rewritten.len() < 2 {
        tracing::warn!("rewrite came back empty, keeping original query");
        query.to_string()
    } else {
        tracing::debug!(original = %query, %rewritten, "query rewritten");
        rewritten
    };

    Ok((rewritten, CallStats::new(response.usage, started.elapsed())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kaiwa_llm::{ChatClient, ChatResponse, ChatStream};

    struct PanickyClient;

    #[async_trait]
    impl ChatClient for PanickyClient {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            panic!("rewrite must not call the LLM on empty history");
        }

        async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream, LlmError> {
            panic!("rewrite never streams");
        }
    }

    #[tokio::test]
    async fn empty_history_short_circuits_without_llm_call() {
        let ctx = StageContext {
            llm: &PanickyClient,
            model: "test-model",
            max_tokens: 128,
        };
        let (rewritten, stats) = rewrite_query(&ctx, "what about the pH?", &[], None)
            .await
            .unwrap();

        assert_eq!(rewritten, "what about the pH?");
        assert!(stats.usage.is_none());
    }
}
