pub mod client;
pub mod sse;
pub mod types;

pub use client::{ExpertClient, ExpertClientBuilder};
pub use types::{ConsultRequest, ExpertResult, AGENT_TYPE_JAPAN};
