use crate::prompts;
use crate::stages::StageContext;
use crate::stages::intent::Intent;
use kaiwa_llm::{format_messages, CallStats, ChatRequest, LlmError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

const ROUTING_TEMPERATURE: f32 = 0.2;

/// Which path answers this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(default)]
    pub needs_expert: bool,
    #[serde(default)]
    pub needs_data: bool,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub reason: String,
}

impl RoutingDecision {
    /// The safe default: answer locally.
    pub fn direct(reason: impl Into<String>) -> Self {
        Self {
            needs_expert: false,
            needs_data: false,
            decision: "answer_directly".to_string(),
            reason: reason.into(),
        }
    }

    /// Parse a model reply, tolerating code fences and prose around the
    /// JSON object. Unparseable replies become a direct-answer decision.
    pub fn parse(raw: &str) -> Self {
        let Some(json) = extract_json_object(raw) else {
            return Self::direct("unparseable routing reply");
        };
        match serde_json::from_str::<RawDecision>(json) {
            Ok(parsed) => Self {
                // Only fill needs_expert from needs_data when the reply
                // left the key out; an explicit false stands.
                needs_expert: parsed.needs_expert.unwrap_or(parsed.needs_data),
                needs_data: parsed.needs_data,
                decision: parsed.decision,
                reason: parsed.reason,
            },
            Err(_) => Self::direct("unparseable routing reply"),
        }
    }
}

/// Raw reply shape; `needs_expert` stays an `Option` so an absent key is
/// distinguishable from an explicit `false`.
#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    needs_expert: Option<bool>,
    #[serde(default)]
    needs_data: bool,
    #[serde(default)]
    decision: String,
    #[serde(default)]
    reason: String,
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Decide whether the upstream expert should handle the turn.
pub async fn route(
    ctx: &StageContext<'_>,
    query: &str,
    intent: Intent,
    context: Option<&Value>,
) -> Result<(RoutingDecision, CallStats), LlmError> {
    let started = Instant::now();

    let context_block = context
        .map(|c| format!("\nContext: {c}"))
        .unwrap_or_default();
    let user = prompts::routing_user(query, intent.as_str(), &context_block);
    let request = ChatRequest::new(ctx.model, format_messages(prompts::ROUTING_SYSTEM, &[], &user))
        .temperature(ROUTING_TEMPERATURE)
        .max_tokens(256);

    let response = ctx.llm.chat(request).await?;
    let decision = RoutingDecision::parse(&response.content);
    tracing::info!(decision = %decision.decision, needs_expert = decision.needs_expert, "routing decision");

    Ok((decision, CallStats::new(response.usage, started.elapsed())))
}
