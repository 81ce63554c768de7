pub mod config;
pub mod device;
pub mod expert;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod stages;
pub mod weather;

pub use config::{ExpertStreamMode, PipelineConfig};
pub use device::{DeviceGateway, DeviceOutcome};
pub use expert::ExpertConsult;
pub use orchestrator::{Orchestrator, TurnHandle, TurnRequest};
pub use stages::intent::Intent;
pub use stages::routing::RoutingDecision;
pub use weather::WeatherProvider;
