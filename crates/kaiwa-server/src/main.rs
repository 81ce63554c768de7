use axum::routing::get;
use axum::{Json, Router};
use kaiwa_expert::ExpertClient;
use kaiwa_llm::{ChatClient, OpenAiCompatClient};
use kaiwa_persist::{HistoryStore, PersistClient};
use kaiwa_pipeline::{Orchestrator, PipelineConfig};
use kaiwa_server::weather::OpenWeatherProvider;
use kaiwa_server::{ws, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    init_logging(&config);

    tracing::info!("starting kaiwa gateway");

    tracing::info!(
        host = %config.mysql_host,
        database = %config.mysql_database,
        "connecting to MySQL"
    );
    let mut session_defaults = kaiwa_types::SessionConfig::default();
    session_defaults.model = config.llm_model.clone();
    session_defaults.temperature = config.llm_temperature;
    let persist = PersistClient::connect(&config.database_url())
        .await?
        .with_default_config(session_defaults);

    let llm: Arc<dyn ChatClient> = Arc::new(OpenAiCompatClient::with_base_url(
        config.llm_api_key.clone(),
        config.llm_base_url.clone(),
    )?);

    let mut expert_builder = ExpertClient::builder()
        .base_url(config.expert_api_base_url.clone().unwrap_or_default())
        .timeout(Duration::from_secs(config.expert_api_timeout))
        .enabled(config.enable_expert_consultation);
    if let Some(key) = &config.expert_api_key {
        expert_builder = expert_builder.api_key(key.clone());
    }
    let expert = expert_builder.build();
    if expert.is_configured() {
        tracing::info!("expert consultation enabled");
    } else {
        tracing::warn!("expert consultation not configured, turns will answer locally");
    }

    let history: Arc<dyn HistoryStore> = Arc::new(persist.history().clone());
    let mut orchestrator = Orchestrator::new(
        llm.clone(),
        Arc::new(expert),
        history,
        PipelineConfig {
            expert_stream_mode: config.expert_stream_mode,
            ..PipelineConfig::default()
        },
    );

    if config.enable_weather_service {
        if let Some(key) = config.openweather_api_key.clone() {
            orchestrator = orchestrator.with_weather(Arc::new(OpenWeatherProvider::new(
                llm.clone(),
                config.llm_model.clone(),
                key,
                config.openweather_base_url.clone(),
                config.weather_default_location.clone(),
            )));
            tracing::info!("weather service enabled");
        }
    }

    let addr = config.bind_addr();
    let state = AppState::new(config, persist, orchestrator);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
