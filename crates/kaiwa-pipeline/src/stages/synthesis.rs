use crate::prompts;
use crate::stages::StageContext;
use kaiwa_llm::{format_messages, ChatRequest, ChatStream, LlmError, Message};
use kaiwa_types::{HistoryEntry, SessionConfig};

/// Everything the final answer may be grounded on.
#[derive(Debug, Default)]
pub struct SynthesisInput<'a> {
    pub user_text: &'a str,
    pub history: &'a [HistoryEntry],
    pub expert_answer: Option<&'a str>,
    pub weather: Option<&'a str>,
    pub device_summary: Option<&'a str>,
    /// History failed to load; the reply should acknowledge the lost
    /// context.
    pub degraded: bool,
}

/// Build the prompt window for the final streamed answer.
pub fn build_messages(session: &SessionConfig, input: &SynthesisInput<'_>) -> Vec<Message> {
    let user = prompts::synthesis_user(
        input.user_text,
        input.expert_answer,
        input.weather,
        input.device_summary,
        input.degraded,
    );
    format_messages(&session.system_prompt, input.history, &user)
}

/// Open the streaming completion for the final answer.
pub async fn open_stream(
    ctx: &StageContext<'_>,
    session: &SessionConfig,
    input: &SynthesisInput<'_>,
) -> Result<ChatStream, LlmError> {
    let request = ChatRequest::new(ctx.model, build_messages(session, input))
        .temperature(session.temperature)
        .max_tokens(session.max_tokens);
    ctx.llm.chat_stream(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaiwa_types::Role;

    #[test]
    fn prompt_window_keeps_history_between_system_and_user() {
        let session = SessionConfig::default();
        let history = vec![
            HistoryEntry::new(Role::User, "how is tank 1?"),
            HistoryEntry::new(Role::Assistant, "stable"),
        ];
        let input = SynthesisInput {
            user_text: "and tank 2?",
            history: &history,
            ..Default::default()
        };

        let messages = build_messages(&session, &input);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "how is tank 1?");
        assert!(messages[3].content.contains("and tank 2?"));
    }

    #[test]
    fn expert_grounding_lands_in_the_user_turn() {
        let session = SessionConfig::default();
        let input = SynthesisInput {
            user_text: "summarize",
            history: &[],
            expert_answer: Some("nitrite spiked on Tuesday"),
            ..Default::default()
        };

        let messages = build_messages(&session, &input);
        let user_turn = &messages.last().unwrap().content;
        assert!(user_turn.contains("nitrite spiked on Tuesday"));
    }
}
