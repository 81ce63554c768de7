use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default system prompt for a freshly created session.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant for a land-based shrimp \
aquaculture operation in Japan. Answer questions about water quality, feeding, equipment \
and farm records clearly and concisely, and ask for clarification when a request is \
ambiguous.";

/// Per-session configuration snapshot.
///
/// Stored as JSON in the `sessions.config` column and handed back verbatim on
/// `init`. Keys the gateway does not recognize are kept in `extra` so a
/// round-trip through storage never drops client-supplied settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_collection")]
    pub collection_name: String,
    #[serde(default = "default_topk")]
    pub topk_single: u32,
    #[serde(default = "default_topk")]
    pub topk_multi: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_mode() -> String {
    "single".to_string()
}

fn default_collection() -> String {
    "japan_shrimp".to_string()
}

fn default_topk() -> u32 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            rag: RagConfig::default(),
            mode: default_mode(),
            extra: Map::new(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection_name: default_collection(),
            topk_single: default_topk(),
            topk_multi: default_topk(),
            extra: Map::new(),
        }
    }
}

impl SessionConfig {
    /// Parse a stored config blob, falling back to the defaults when the
    /// column is empty or holds something unreadable.
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    /// Deep-merge a JSON patch into this config. Objects merge key-by-key,
    /// everything else is replaced wholesale. Unknown keys survive in
    /// `extra`.
    pub fn merge_patch(&mut self, patch: &Value) {
        let mut current = match serde_json::to_value(&*self) {
            Ok(v) => v,
            Err(_) => return,
        };
        deep_merge(&mut current, patch);
        if let Ok(merged) = serde_json::from_value(current) {
            *self = merged;
        }
    }
}

fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_matches_contract() {
        let config = SessionConfig::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.mode, "single");
        assert_eq!(config.rag.collection_name, "japan_shrimp");
        assert_eq!(config.rag.topk_single, 5);
        assert_eq!(config.rag.topk_multi, 5);
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = json!({
            "model": "gpt-4o",
            "temperature": 0.2,
            "token_count": 1024,
            "rag": { "collection_name": "ponds", "pinned": true }
        })
        .to_string();

        let config = SessionConfig::from_stored(Some(&raw));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.extra.get("token_count"), Some(&json!(1024)));
        assert_eq!(config.rag.extra.get("pinned"), Some(&json!(true)));

        let back: Value = serde_json::to_value(&config).unwrap();
        assert_eq!(back["token_count"], json!(1024));
        assert_eq!(back["rag"]["pinned"], json!(true));
    }

    #[test]
    fn stored_garbage_falls_back_to_defaults() {
        assert_eq!(
            SessionConfig::from_stored(Some("not json")),
            SessionConfig::default()
        );
        assert_eq!(SessionConfig::from_stored(None), SessionConfig::default());
    }

    #[test]
    fn merge_patch_is_deep() {
        let mut config = SessionConfig::default();
        config.merge_patch(&json!({
            "temperature": 0.3,
            "rag": { "topk_single": 8 },
            "summary_amount": 5
        }));

        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.rag.topk_single, 8);
        // untouched siblings survive the merge
        assert_eq!(config.rag.topk_multi, 5);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.extra.get("summary_amount"), Some(&json!(5)));
    }
}
