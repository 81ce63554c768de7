use async_trait::async_trait;
use kaiwa_expert::{ConsultRequest, ExpertClient, ExpertResult};

/// Capability the orchestrator needs from the expert channel.
///
/// `ExpertClient` implements it for production; tests substitute scripted
/// fakes. Chunks are delivered to `on_chunk` in receive order before the
/// call returns.
#[async_trait]
pub trait ExpertConsult: Send + Sync {
    async fn consult(
        &self,
        request: &ConsultRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ExpertResult;
}

#[async_trait]
impl ExpertConsult for ExpertClient {
    async fn consult(
        &self,
        request: &ConsultRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ExpertResult {
        ExpertClient::consult(self, request, on_chunk).await
    }
}
