use crate::config::Config;
use kaiwa_persist::PersistClient;
use kaiwa_pipeline::Orchestrator;
use std::sync::Arc;

/// Shared application state handed to every connection.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: Arc<PersistClient>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(config: Config, persist: PersistClient, orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::new(config),
            persist: Arc::new(persist),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
