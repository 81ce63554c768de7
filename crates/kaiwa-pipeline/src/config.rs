use serde::{Deserialize, Serialize};

/// How expert tokens reach the client when routing picks the expert path.
///
/// Either mode keeps a single active producer per turn; the mode is part
/// of the startup config snapshot and never changes mid-turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertStreamMode {
    /// Forward expert chunks directly as the assistant stream; no
    /// synthesis pass afterwards.
    #[default]
    Forward,
    /// Buffer the expert answer silently and stream only the synthesis
    /// pass grounded on it.
    Synthesize,
}

/// Immutable pipeline settings, snapshotted at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub expert_stream_mode: ExpertStreamMode,
    /// History window loaded at the start of each turn.
    pub history_limit: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expert_stream_mode: ExpertStreamMode::default(),
            history_limit: kaiwa_persist::DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_mode_parses_lowercase() {
        let mode: ExpertStreamMode = serde_json::from_str("\"synthesize\"").unwrap();
        assert_eq!(mode, ExpertStreamMode::Synthesize);
        assert_eq!(ExpertStreamMode::default(), ExpertStreamMode::Forward);
    }
}
