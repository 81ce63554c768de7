use crate::prompts;
use crate::stages::StageContext;
use kaiwa_llm::{format_messages, CallStats, ChatRequest, LlmError};
use std::time::Instant;

const INTENT_TEMPERATURE: f32 = 0.1;

/// Closed set of intent labels the pipeline branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intent {
    Chitchat,
    DataQuery,
    DeviceControl,
    DomainKnowledge,
    #[default]
    Other,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Chitchat => "chitchat",
            Intent::DataQuery => "data_query",
            Intent::DeviceControl => "device_control",
            Intent::DomainKnowledge => "domain_knowledge",
            Intent::Other => "other",
        }
    }

    const ALL: [Intent; 5] = [
        Intent::Chitchat,
        Intent::DataQuery,
        Intent::DeviceControl,
        Intent::DomainKnowledge,
        Intent::Other,
    ];

    /// Parse a model reply into a label. Exact match first; then a
    /// contains-scan to salvage replies wrapped in a full sentence; `other`
    /// when nothing matches.
    pub fn parse(raw: &str) -> Intent {
        let cleaned = raw
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '.' || c == '`')
            .to_lowercase();

        for intent in Intent::ALL {
            if cleaned == intent.as_str() {
                return intent;
            }
        }
        for intent in Intent::ALL {
            if cleaned.contains(intent.as_str()) {
                return intent;
            }
        }
        Intent::Other
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one user message.
///
/// Deliberately classifies on the raw message alone: feeding the history in
/// makes the model answer the conversation instead of labeling it.
pub async fn classify_intent(
    ctx: &StageContext<'_>,
    query: &str,
) -> Result<(Intent, CallStats), LlmError> {
    let started = Instant::now();
    let messages = format_messages(prompts::INTENT_SYSTEM, &[], query);
    let request = ChatRequest::new(ctx.model, messages)
        .temperature(INTENT_TEMPERATURE)
        .max_tokens(32);

    let response = ctx.llm.chat(request).await?;
    let intent = Intent::parse(&response.content);
    if intent == Intent::Other && !response.content.trim().is_empty() {
        tracing::debug!(raw = %response.content.trim(), "unrecognized intent label");
    }

    Ok((intent, CallStats::new(response.usage, started.elapsed())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_labels() {
        assert_eq!(Intent::parse("data_query"), Intent::DataQuery);
        assert_eq!(Intent::parse(" device_control "), Intent::DeviceControl);
        assert_eq!(Intent::parse("\"chitchat\""), Intent::Chitchat);
    }

    #[test]
    fn salvages_labels_inside_sentences() {
        assert_eq!(
            Intent::parse("The intent is data_query."),
            Intent::DataQuery
        );
        assert_eq!(
            Intent::parse("domain_knowledge fits best here"),
            Intent::DomainKnowledge
        );
    }

    #[test]
    fn unknown_labels_fall_back_to_other() {
        assert_eq!(Intent::parse("report_generation"), Intent::Other);
        assert_eq!(Intent::parse(""), Intent::Other);
    }
}
