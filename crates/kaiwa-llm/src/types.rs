use kaiwa_types::{HistoryEntry, Role};
use serde::{Deserialize, Serialize};

/// One message of the dialogue sent to the chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&HistoryEntry> for Message {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            role: entry.role,
            content: entry.content.clone(),
        }
    }
}

/// Assemble the standard prompt window: system prompt, then the history
/// window in order, then the current user message. Empty history entries
/// are dropped.
pub fn format_messages(
    system_prompt: &str,
    history: &[HistoryEntry],
    user_message: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    for entry in history {
        if !entry.content.is_empty() {
            messages.push(Message::from(entry));
        }
    }
    messages.push(Message::user(user_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_messages_orders_system_history_user() {
        let history = vec![
            HistoryEntry::new(Role::User, "how warm is tank 3?"),
            HistoryEntry::new(Role::Assistant, "26.1 C this morning."),
            HistoryEntry::new(Role::User, ""),
        ];
        let messages = format_messages("you are helpful", &history, "and the pH?");

        assert_eq!(messages.len(), 4); // empty entry dropped
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "how warm is tank 3?");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages.last().unwrap().content, "and the pH?");
    }

    #[test]
    fn message_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }
}
