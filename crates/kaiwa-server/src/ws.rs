//! WebSocket session handling: one task per connection, a single writer
//! for the socket, and a bounded turn queue drained strictly in order.

use crate::protocol::{parse_inbound, InboundFrame, OutboundFrame, UserMessage};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use kaiwa_pipeline::TurnRequest;
use kaiwa_types::{ErrorCode, SessionConfig, TurnEvent};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Messages a connection may have waiting while a turn is in flight.
pub const INBOUND_QUEUE_LIMIT: usize = 4;
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection state, owned by the reader loop.
#[derive(Default)]
struct ConnectionState {
    session_id: Option<String>,
    config: SessionConfig,
    initialized: bool,
}

/// One queued user turn, with the session snapshot taken at receipt time.
struct TurnJob {
    session_id: String,
    config: SessionConfig,
    message: UserMessage,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    tracing::info!("websocket connection established");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Single socket writer; everything outbound funnels through here.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let cancel = CancellationToken::new();
    let (turn_tx, turn_rx) = mpsc::channel::<TurnJob>(INBOUND_QUEUE_LIMIT);
    let worker = tokio::spawn(turn_worker(
        state.clone(),
        turn_rx,
        out_tx.clone(),
        cancel.clone(),
    ));

    let mut conn = ConnectionState::default();
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &mut conn, &text, &out_tx, &turn_tx).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // Disconnect: cancel in-flight upstream calls, drain nothing further.
    cancel.cancel();
    drop(turn_tx);
    let _ = worker.await;
    drop(out_tx);
    let _ = writer.await;

    tracing::info!(
        session_id = conn.session_id.as_deref().unwrap_or(""),
        "websocket connection closed"
    );
}

fn send(out: &mpsc::UnboundedSender<Message>, frame: OutboundFrame) {
    let _ = out.send(Message::Text(frame.to_json()));
}

async fn handle_frame(
    state: &AppState,
    conn: &mut ConnectionState,
    text: &str,
    out: &mpsc::UnboundedSender<Message>,
    turns: &mpsc::Sender<TurnJob>,
) {
    let frame = match parse_inbound(text) {
        Ok(frame) => frame,
        Err(error) => {
            send(
                out,
                OutboundFrame::error(ErrorCode::ValidationError, error.to_string()),
            );
            return;
        }
    };

    match frame {
        InboundFrame::Ping => send(out, OutboundFrame::Pong),
        InboundFrame::Init {
            session_id,
            user_id,
        } => handle_init(state, conn, session_id, user_id, out).await,
        InboundFrame::UserMessage(message) => handle_user_message(conn, message, out, turns),
        InboundFrame::UpdateConfig { session_id, patch } => {
            handle_update_config(state, conn, session_id, patch, out).await;
        }
    }
}

async fn handle_init(
    state: &AppState,
    conn: &mut ConnectionState,
    session_id: Option<String>,
    user_id: String,
    out: &mpsc::UnboundedSender<Message>,
) {
    let ensure = state
        .persist
        .sessions()
        .ensure(session_id.as_deref(), &user_id);

    match tokio::time::timeout(INIT_TIMEOUT, ensure).await {
        Err(_) => {
            tracing::error!(%user_id, "session initialization timed out");
            send(
                out,
                OutboundFrame::error(ErrorCode::Timeout, "session initialization timed out"),
            );
        }
        Ok(Err(error)) => {
            tracing::error!(%user_id, %error, "session initialization failed");
            send(
                out,
                OutboundFrame::error(ErrorCode::StorageError, "failed to initialize session"),
            );
        }
        Ok(Ok(bootstrap)) => {
            conn.session_id = Some(bootstrap.session_id.clone());
            conn.config = bootstrap.config.clone();
            conn.initialized = true;

            tracing::info!(
                session_id = %bootstrap.session_id,
                %user_id,
                messages = bootstrap.messages.len(),
                "session initialized"
            );
            let messages = bootstrap.messages.iter().map(|m| m.to_wire()).collect();
            send(
                out,
                OutboundFrame::Init {
                    session_id: bootstrap.session_id,
                    messages,
                    config: bootstrap.config,
                },
            );
        }
    }
}

fn handle_user_message(
    conn: &mut ConnectionState,
    message: UserMessage,
    out: &mpsc::UnboundedSender<Message>,
    turns: &mpsc::Sender<TurnJob>,
) {
    if !conn.initialized {
        send(
            out,
            OutboundFrame::error(ErrorCode::NotInitialized, "send an init frame first"),
        );
        return;
    }
    let Some(session_id) = conn.session_id.clone() else {
        send(
            out,
            OutboundFrame::error(ErrorCode::NotInitialized, "send an init frame first"),
        );
        return;
    };

    // This reader task is the queue's only producer, so checking capacity
    // before the echo cannot race with the enqueue below.
    if turns.capacity() == 0 {
        tracing::warn!(%session_id, "turn queue full, dropping message");
        send(
            out,
            OutboundFrame::error(ErrorCode::Busy, "previous messages are still being processed"),
        );
        return;
    }

    // Receipt echo; guaranteed to hit the socket before any chunk of this
    // turn because the turn is enqueued afterwards.
    send(
        out,
        OutboundFrame::user_echo(
            session_id.as_str(),
            message.content.as_str(),
            Uuid::new_v4().to_string(),
            Utc::now().timestamp(),
            message.message_type.as_deref(),
        ),
    );

    let job = TurnJob {
        session_id,
        config: conn.config.clone(),
        message,
    };
    if turns.try_send(job).is_err() {
        send(
            out,
            OutboundFrame::error(ErrorCode::Internal, "failed to queue message"),
        );
    }
}

async fn handle_update_config(
    state: &AppState,
    conn: &mut ConnectionState,
    session_id: Option<String>,
    patch: Value,
    out: &mpsc::UnboundedSender<Message>,
) {
    let target = session_id.or_else(|| conn.session_id.clone());
    let session_id = match target {
        Some(id) if conn.initialized => id,
        _ => {
            send(
                out,
                OutboundFrame::error(ErrorCode::NotInitialized, "send an init frame first"),
            );
            return;
        }
    };

    match state
        .persist
        .sessions()
        .update_config(&session_id, &patch)
        .await
    {
        Ok(config) => {
            if conn.session_id.as_deref() == Some(session_id.as_str()) {
                conn.config = config.clone();
            }
            send(out, OutboundFrame::UpdateConfigAck { session_id, config });
        }
        Err(error) => {
            tracing::error!(%session_id, %error, "config update failed");
            send(
                out,
                OutboundFrame::error(ErrorCode::StorageError, "failed to update config"),
            );
        }
    }
}

/// Drain queued turns one at a time, translating pipeline events into
/// outbound frames. Every frame of a turn carries the orchestrator's
/// pre-allocated assistant identifiers.
async fn turn_worker(
    state: AppState,
    mut turns: mpsc::Receiver<TurnJob>,
    out: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
) {
    while let Some(job) = turns.recv().await {
        if cancel.is_cancelled() {
            break;
        }

        let request = TurnRequest {
            session_id: job.session_id.clone(),
            user_text: job.message.content,
            user_message_type: job.message.message_type,
            context: job.message.context,
            config: job.config,
        };
        let mut handle = state.orchestrator.spawn_turn(request, cancel.child_token());

        while let Some(event) = handle.events.recv().await {
            let frame = match event {
                TurnEvent::Chunk { content } => OutboundFrame::stream_chunk(
                    job.session_id.as_str(),
                    content,
                    handle.assistant_message_id.as_str(),
                    handle.assistant_timestamp,
                ),
                TurnEvent::Error { code, message } => OutboundFrame::error(code, message),
                TurnEvent::Done { warning } => OutboundFrame::done(
                    job.session_id.as_str(),
                    handle.assistant_message_id.as_str(),
                    warning,
                ),
            };
            if out.send(Message::Text(frame.to_json())).is_err() {
                return;
            }
        }
    }
}
