use crate::config::{ExpertStreamMode, PipelineConfig};
use crate::device::DeviceGateway;
use crate::expert::ExpertConsult;
use crate::prompts;
use crate::retry;
use crate::stages::intent::{classify_intent, Intent};
use crate::stages::rewrite::rewrite_query;
use crate::stages::routing::{route, RoutingDecision};
use crate::stages::synthesis::{open_stream, SynthesisInput};
use crate::stages::StageContext;
use crate::weather::WeatherProvider;
use chrono::Utc;
use kaiwa_expert::ConsultRequest;
use kaiwa_llm::{collect_stream, CallStats, ChatClient, LlmError};
use kaiwa_persist::{format_for_llm, HistoryStore, NewMessage};
use kaiwa_types::{ErrorCode, HistoryEntry, Role, SessionConfig, TurnEvent};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One user message entering the pipeline.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_text: String,
    /// Explicit type tag from the client frame, defaults to "text".
    pub user_message_type: Option<String>,
    pub context: Option<Value>,
    /// Session config snapshot for this turn.
    pub config: SessionConfig,
}

/// Handle to a running turn. The assistant identifiers are allocated
/// before any streaming starts so every emitted chunk can carry them.
pub struct TurnHandle {
    pub assistant_message_id: String,
    pub assistant_timestamp: i64,
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
}

/// Runs the per-turn state machine.
///
/// All collaborators are injected at construction; the orchestrator holds
/// no global state and is shared across connections behind an `Arc`.
pub struct Orchestrator {
    llm: Arc<dyn ChatClient>,
    expert: Arc<dyn ExpertConsult>,
    history: Arc<dyn HistoryStore>,
    weather: Option<Arc<dyn WeatherProvider>>,
    device: Option<Arc<dyn DeviceGateway>>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn ChatClient>,
        expert: Arc<dyn ExpertConsult>,
        history: Arc<dyn HistoryStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            expert,
            history,
            weather: None,
            device: None,
            config,
        }
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceGateway>) -> Self {
        self.device = Some(device);
        self
    }

    /// Start one turn on a background task and hand back its identifiers
    /// and event stream. Turn events stop (the channel closes) when the
    /// turn is finished or canceled.
    pub fn spawn_turn(&self, request: TurnRequest, cancel: CancellationToken) -> TurnHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let assistant_message_id = Uuid::new_v4().to_string();
        let assistant_timestamp = Utc::now().timestamp();

        let run = TurnRun {
            llm: Arc::clone(&self.llm),
            expert: Arc::clone(&self.expert),
            history: Arc::clone(&self.history),
            weather: self.weather.clone(),
            device: self.device.clone(),
            config: self.config.clone(),
            request,
            cancel,
            tx,
            message_id: assistant_message_id.clone(),
        };
        tokio::spawn(run.run());

        TurnHandle {
            assistant_message_id,
            assistant_timestamp,
            events: rx,
        }
    }
}

/// Transient state of one turn; created at turn start, dropped at turn
/// end.
#[derive(Default)]
struct TurnState {
    history: Vec<HistoryEntry>,
    /// The provider was asked, whether or not it produced a context.
    weather_queried: bool,
    weather_context: Option<String>,
    intent: Intent,
    rewritten: Option<String>,
    routing: Option<RoutingDecision>,
    expert_consulted: bool,
    expert_answer: Option<String>,
    device_summary: Option<String>,
    /// Accumulates exactly the chunks emitted to the client.
    buffer: String,
    stats: CallStats,
}

enum SynthOutcome {
    Completed,
    Canceled,
}

struct TurnRun {
    llm: Arc<dyn ChatClient>,
    expert: Arc<dyn ExpertConsult>,
    history: Arc<dyn HistoryStore>,
    weather: Option<Arc<dyn WeatherProvider>>,
    device: Option<Arc<dyn DeviceGateway>>,
    config: PipelineConfig,
    request: TurnRequest,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TurnEvent>,
    message_id: String,
}

impl TurnRun {
    async fn run(self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let session_id = self.request.session_id.clone();
        let started = Instant::now();
        let mut state = TurnState::default();

        // LOAD_HISTORY
        let degraded = match self
            .guarded(self.history.recent(&session_id, self.config.history_limit))
            .await
        {
            None => return,
            Some(Ok(rows)) => {
                state.history = format_for_llm(&rows);
                false
            }
            Some(Err(error)) => {
                tracing::warn!(%session_id, %error, "history load failed, degrading turn");
                true
            }
        };

        // PERSIST_USER
        let user_row = NewMessage::new(session_id.as_str(), Role::User, self.request.user_text.as_str())
            .message_type(
                self.request
                    .user_message_type
                    .clone()
                    .unwrap_or_else(|| "text".to_string()),
            );
        if let Err(error) = self.history.append(user_row).await {
            // FAIL_HARD: nothing streamed yet, nothing else to clean up.
            tracing::error!(%session_id, %error, "failed to persist user message");
            self.emit(TurnEvent::Error {
                code: ErrorCode::StorageError,
                message: "failed to record your message, please try again".to_string(),
            });
            return;
        }
        if self.cancel.is_cancelled() {
            return;
        }

        if degraded {
            // FAIL_SOFT: tell the client, then answer as well as we can
            // without any context.
            self.emit(TurnEvent::Error {
                code: ErrorCode::StorageError,
                message: "conversation history is temporarily unavailable".to_string(),
            });
            let input = SynthesisInput {
                user_text: &self.request.user_text,
                history: &[],
                degraded: true,
                ..Default::default()
            };
            let mut buffer = String::new();
            let mut stats = CallStats::default();
            if let SynthOutcome::Canceled = self.stream_synthesis(&input, &mut buffer, &mut stats).await {
                return;
            }
            state.buffer = buffer;
            state.stats = stats;
            self.persist_and_finish(&session_id, state, started).await;
            return;
        }

        // WEATHER (optional, soft)
        if let Some(provider) = &self.weather {
            state.weather_queried = true;
            match self.guarded(provider.lookup(&self.request.user_text)).await {
                None => return,
                Some(context) => state.weather_context = context,
            }
        }

        // INTENT
        let ctx = self.stage_ctx();
        state.intent = match self
            .guarded(retry::with_backoff(|| {
                classify_intent(&ctx, &self.request.user_text)
            }))
            .await
        {
            None => return,
            Some(Ok((intent, stats))) => {
                state.stats.absorb(stats);
                intent
            }
            Some(Err(LlmError::Canceled)) => return,
            Some(Err(error)) => {
                tracing::warn!(%error, "intent classification failed, defaulting to other");
                Intent::Other
            }
        };
        tracing::info!(%session_id, intent = %state.intent, "intent classified");

        if state.intent == Intent::DeviceControl {
            // DEVICE_BRANCH: ground synthesis on the gateway outcome.
            state.device_summary = Some(match &self.device {
                Some(gateway) => {
                    match self
                        .guarded(gateway.execute(&self.request.user_text, &session_id))
                        .await
                    {
                        None => return,
                        Some(outcome) if outcome.success => outcome.summary,
                        Some(outcome) => format!("Device operation failed: {}", outcome.summary),
                    }
                }
                None => "Device control is not connected to this assistant; no equipment was \
                         operated."
                    .to_string(),
            });
        } else {
            // REWRITE
            match self
                .guarded(retry::with_backoff(|| {
                    rewrite_query(
                        &ctx,
                        &self.request.user_text,
                        &state.history,
                        self.request.context.as_ref(),
                    )
                }))
                .await
            {
                None => return,
                Some(Ok((rewritten, stats))) => {
                    state.stats.absorb(stats);
                    if rewritten != self.request.user_text {
                        state.rewritten = Some(rewritten);
                    }
                }
                Some(Err(LlmError::Canceled)) => return,
                Some(Err(error)) => {
                    tracing::warn!(%error, "query rewrite failed, keeping original");
                }
            }
            let query = state
                .rewritten
                .clone()
                .unwrap_or_else(|| self.request.user_text.clone());

            // ROUTE
            state.routing = match self
                .guarded(retry::with_backoff(|| {
                    route(&ctx, &query, state.intent, self.request.context.as_ref())
                }))
                .await
            {
                None => return,
                Some(Ok((decision, stats))) => {
                    state.stats.absorb(stats);
                    Some(decision)
                }
                Some(Err(LlmError::Canceled)) => return,
                Some(Err(error)) => {
                    tracing::warn!(%error, "routing failed, answering directly");
                    Some(RoutingDecision::direct("routing stage unavailable"))
                }
            };

            // EXPERT_STREAM
            let needs_expert = state
                .routing
                .as_ref()
                .map(|r| r.needs_expert)
                .unwrap_or(false);
            if needs_expert {
                let consult_request = ConsultRequest::japan(query.clone(), session_id.clone())
                    .with_config(expert_config(&self.request.config));
                let forward = self.config.expert_stream_mode == ExpertStreamMode::Forward;
                let tx = self.tx.clone();
                let mut streamed = String::new();

                let result = {
                    let mut on_chunk = |chunk: &str| {
                        if forward {
                            streamed.push_str(chunk);
                            let _ = tx.send(TurnEvent::Chunk {
                                content: chunk.to_string(),
                            });
                        }
                    };
                    let consult = self.expert.consult(&consult_request, &mut on_chunk);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return,
                        result = consult => result,
                    }
                };

                if result.success {
                    state.expert_consulted = true;
                    state.expert_answer = result.answer;
                } else {
                    // Never retried; the turn continues on the no-expert
                    // path. Forward-mode chunks already reached the client
                    // and stay in the buffer so the persisted row matches
                    // the stream.
                    tracing::warn!(
                        %session_id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "expert unavailable, continuing without it"
                    );
                }
                state.buffer = streamed;
            }
        }

        // Forward mode with a successful expert: the expert stream was the
        // whole assistant turn.
        if state.expert_consulted && self.config.expert_stream_mode == ExpertStreamMode::Forward {
            self.persist_and_finish(&session_id, state, started).await;
            return;
        }

        // SYNTH_STREAM
        let input = SynthesisInput {
            user_text: &self.request.user_text,
            history: &state.history,
            expert_answer: state
                .expert_answer
                .as_deref()
                .filter(|_| state.expert_consulted),
            weather: state.weather_context.as_deref(),
            device_summary: state.device_summary.as_deref(),
            degraded: false,
        };
        let mut buffer = std::mem::take(&mut state.buffer);
        let mut stats = std::mem::take(&mut state.stats);
        if let SynthOutcome::Canceled = self.stream_synthesis(&input, &mut buffer, &mut stats).await
        {
            return;
        }
        state.buffer = buffer;
        state.stats = stats;

        self.persist_and_finish(&session_id, state, started).await;
    }

    /// Race a stage against disconnect; `None` means the turn is over.
    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            value = fut => Some(value),
        }
    }

    fn stage_ctx(&self) -> StageContext<'_> {
        StageContext {
            llm: self.llm.as_ref(),
            model: &self.request.config.model,
            max_tokens: self.request.config.max_tokens,
        }
    }

    fn emit(&self, event: TurnEvent) {
        let _ = self.tx.send(event);
    }

    /// Stream the synthesis pass into `buffer`, forwarding every chunk.
    ///
    /// Upstream failure after bounded retries degrades to the apology text
    /// rather than surfacing an error; cancellation stays quiet.
    async fn stream_synthesis(
        &self,
        input: &SynthesisInput<'_>,
        buffer: &mut String,
        stats: &mut CallStats,
    ) -> SynthOutcome {
        let ctx = self.stage_ctx();
        let started = Instant::now();

        let opened = self
            .guarded(retry::with_backoff(|| {
                open_stream(&ctx, &self.request.config, input)
            }))
            .await;

        let stream = match opened {
            None | Some(Err(LlmError::Canceled)) => return SynthOutcome::Canceled,
            Some(Err(error)) => {
                tracing::error!(%error, "synthesis unavailable, sending apology");
                self.emit_chunk(buffer, prompts::APOLOGY_TEXT);
                return SynthOutcome::Completed;
            }
            Some(Ok(stream)) => stream,
        };

        let tx = self.tx.clone();
        let result = collect_stream(stream, &self.cancel, |chunk| {
            buffer.push_str(chunk);
            let _ = tx.send(TurnEvent::Chunk {
                content: chunk.to_string(),
            });
        })
        .await;
        stats.absorb(CallStats::new(None, started.elapsed()));

        match result {
            Ok(_) => SynthOutcome::Completed,
            Err(LlmError::Canceled) => SynthOutcome::Canceled,
            Err(error) => {
                tracing::error!(%error, "synthesis stream broke mid-turn");
                if buffer.is_empty() {
                    self.emit_chunk(buffer, prompts::APOLOGY_TEXT);
                }
                SynthOutcome::Completed
            }
        }
    }

    fn emit_chunk(&self, buffer: &mut String, content: &str) {
        buffer.push_str(content);
        self.emit(TurnEvent::Chunk {
            content: content.to_string(),
        });
    }

    /// PERSIST_ASSISTANT, then the terminal event. The buffer is written
    /// exactly once; a persistence failure downgrades to a warning on the
    /// done event.
    async fn persist_and_finish(&self, session_id: &str, state: TurnState, started: Instant) {
        let mut data_sources: Vec<&str> = Vec::new();
        if state.expert_consulted {
            data_sources.push("expert");
        }
        if state.weather_context.is_some() {
            data_sources.push("weather");
        }
        if state.device_summary.is_some() {
            data_sources.push("device");
        }

        let meta = json!({
            "intent": state.intent.as_str(),
            "routing": state.routing,
            "expert_consulted": state.expert_consulted,
            "weather_queried": state.weather_queried,
            "data_sources": data_sources,
        });
        let row = NewMessage::new(session_id, Role::Assistant, state.buffer.as_str())
            .message_type(state.intent.as_str())
            .message_id(self.message_id.as_str())
            .meta_data(meta);

        let warning = match self.history.append(row).await {
            Ok(_) => None,
            Err(error) => {
                tracing::error!(%session_id, %error, "failed to persist assistant message");
                Some("assistant message was not persisted".to_string())
            }
        };

        let usage = state.stats.usage.unwrap_or_default();
        tracing::info!(
            %session_id,
            intent = %state.intent,
            expert_consulted = state.expert_consulted,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn complete"
        );

        self.emit(TurnEvent::Done { warning });
    }
}

/// Config blob forwarded to the expert service, derived from the session
/// snapshot.
fn expert_config(session: &SessionConfig) -> Value {
    json!({
        "rag": {
            "collection_name": session.rag.collection_name,
            "topk_single": session.rag.topk_single,
            "topk_multi": session.rag.topk_multi,
        },
        "mode": session.mode,
        "single": {
            "temperature": 0.4,
            "system_prompt": prompts::EXPERT_SYSTEM,
            "max_tokens": session.max_tokens,
        },
    })
}
