use async_trait::async_trait;

/// Result of asking the device side to act on a request.
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub success: bool,
    /// Human-readable description of what happened, used as grounding for
    /// the synthesized reply.
    pub summary: String,
}

/// External device-control gateway (feeders, pumps, cameras).
///
/// The core ships only this interface; deployments wire in their own
/// implementation. When none is configured the pipeline tells the user
/// device control is unavailable.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn execute(&self, query: &str, session_id: &str) -> DeviceOutcome;
}
