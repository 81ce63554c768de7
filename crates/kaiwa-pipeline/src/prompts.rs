//! Prompt text for the LLM-backed stages.

use chrono::{DateTime, Utc};

/// Shown to the user when synthesis itself is unavailable.
pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong while answering your question. Please try again in a moment.";

pub const INTENT_SYSTEM: &str = "\
You classify one user message from an aquaculture farm assistant into exactly one intent label.

Labels:
- chitchat: greetings, thanks, small talk, anything not about the farm
- data_query: questions about sensor readings, statistics, history, trends or analysis of farm data
- device_control: requests to operate equipment such as feeders, pumps, aerators or cameras
- domain_knowledge: general aquaculture questions about biology, husbandry or best practice
- other: anything that fits none of the above

Reply with the label only, nothing else.";

pub const ROUTING_SYSTEM: &str = "\
You are a routing expert for an aquaculture assistant. Decide whether answering the user \
requires consulting the external aquaculture data expert, which can query and aggregate \
farm records.

Choose:
1. Consult the expert (needs_expert: true, needs_data: true) when the user asks about \
data, statistics, historical records, or needs professional analysis.
2. Answer directly (needs_expert: false, needs_data: false) for chat and general questions.

Reply with JSON only:
{\"decision\": \"consult_expert|answer_directly\", \"reason\": \"...\", \
\"needs_expert\": true/false, \"needs_data\": true/false}";

/// System prompt sent along to the expert service itself.
pub const EXPERT_SYSTEM: &str = "\
You are an expert in Japanese land-based aquaculture. Using the retrieved knowledge and \
farm records, run the data queries and aggregation the question calls for and give a \
professional conclusion with recommendations.";

const REWRITE_SYSTEM: &str = "\
Today is {current_date}. You rewrite follow-up questions for an aquaculture assistant so \
they stand on their own. Resolve pronouns and ellipsis against the conversation history, \
keep the user's language, and add nothing that was not asked. If the question is already \
self-contained, return it unchanged. Reply with the rewritten query only.";

pub fn rewrite_system(now: DateTime<Utc>) -> String {
    REWRITE_SYSTEM.replace("{current_date}", &now.format("%Y-%m-%d").to_string())
}

pub fn rewrite_user(history_block: &str, context_block: &str, query: &str) -> String {
    let history = if history_block.is_empty() {
        "(no history)"
    } else {
        history_block
    };
    format!(
        "Conversation history:\n{history}{context_block}\n\nCurrent question: {query}\n\n\
         Rewrite the question so it can be understood without the history."
    )
}

pub fn routing_user(query: &str, intent: &str, context_block: &str) -> String {
    format!("User intent: {intent}\nUser message: {query}{context_block}\n\nMake the routing decision.")
}

/// Grounding block prepended to the synthesis user turn when an expert
/// answer is available.
pub fn synthesis_user(
    query: &str,
    expert_answer: Option<&str>,
    weather: Option<&str>,
    device_summary: Option<&str>,
    degraded: bool,
) -> String {
    let mut prompt = format!("User question: {query}");
    if let Some(answer) = expert_answer {
        prompt.push_str(&format!("\n\nAquaculture expert answer:\n{answer}"));
    }
    if let Some(device) = device_summary {
        prompt.push_str(&format!("\n\nDevice operation result:\n{device}"));
    }
    if let Some(weather) = weather {
        prompt.push_str(&format!("\n\n{weather}"));
    }
    prompt.push_str(
        "\n\nAnswer the user's question based on the information above. Keep the reply \
         professional, accurate and easy to read.",
    );
    if expert_answer.is_some() {
        prompt.push_str(" Base the reply on the expert answer.");
    }
    if weather.is_some() {
        prompt.push_str(" Where the weather matters, factor it into the advice.");
    }
    if degraded {
        prompt.push_str(
            " The conversation history could not be loaded; briefly apologize for any \
             lost context before answering.",
        );
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rewrite_system_fills_in_the_date() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let prompt = rewrite_system(now);
        assert!(prompt.contains("2025-06-01"));
        assert!(!prompt.contains("{current_date}"));
    }

    #[test]
    fn synthesis_user_mentions_expert_grounding_only_when_present() {
        let with = synthesis_user("q", Some("expert says"), None, None, false);
        assert!(with.contains("expert says"));
        assert!(with.contains("Base the reply on the expert answer."));

        let without = synthesis_user("q", None, None, None, false);
        assert!(!without.contains("Base the reply on the expert answer."));
    }
}
