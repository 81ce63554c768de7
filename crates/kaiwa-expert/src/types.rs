use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent label of the conversational aquaculture expert.
pub const AGENT_TYPE_JAPAN: &str = "japan";

/// One consultation against the upstream expert service.
#[derive(Debug, Clone)]
pub struct ConsultRequest {
    pub query: String,
    pub agent_type: String,
    pub session_id: String,
    /// Optional LLM/RAG configuration, JSON-encoded into the `config`
    /// query parameter when present.
    pub config: Option<Value>,
}

impl ConsultRequest {
    /// Request against the conversational expert.
    pub fn japan(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            agent_type: AGENT_TYPE_JAPAN.to_string(),
            session_id: session_id.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Outcome of one consultation. `answer` is the full concatenation of the
/// content chunks received before the stream terminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExpertResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: None,
            confidence: None,
            sources: Vec::new(),
            metadata: None,
            error: Some(error.into()),
        }
    }

    pub(crate) fn not_configured() -> Self {
        Self::failure("not_configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn japan_request_uses_fixed_agent_type() {
        let req = ConsultRequest::japan("how is the pH trending?", "sess-1");
        assert_eq!(req.agent_type, "japan");
        assert!(req.config.is_none());
    }

    #[test]
    fn failure_result_has_no_answer() {
        let result = ExpertResult::failure("timeout");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timeout"));
        assert!(result.answer.is_none());
    }
}
