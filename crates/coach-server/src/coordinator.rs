//! WebSocket coordinator: multiplexes client connections over the pools.
//!
//! Each connection gets one read loop and one write task; every request
//! runs in its own task so a slow analysis never blocks the socket. Results
//! and streamed progress for superseded requests are discarded, but the
//! underlying engine search is left to finish under its own budget.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use analysis::{run_analysis, AnalysisError, RequestKind};
use engine_pool::fen;

use crate::messages::{ClientMessage, RequestBody, ServerMessage};
use crate::state::{AppState, CurrentRequests};

/// Axum handler for WebSocket upgrade requests.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Single writer; request tasks send through the channel.
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to encode outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let current = CurrentRequests::default();
    info!("client connected");

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Ping) => {
                let _ = out_tx.send(ServerMessage::Pong);
            }
            Ok(ClientMessage::Suggestion(body)) => {
                spawn_request(
                    RequestKind::Suggestion,
                    body,
                    state.clone(),
                    out_tx.clone(),
                    current.clone(),
                );
            }
            Ok(ClientMessage::Analysis(body)) => {
                spawn_request(
                    RequestKind::Analysis,
                    body,
                    state.clone(),
                    out_tx.clone(),
                    current.clone(),
                );
            }
            Err(err) => {
                debug!(error = %err, "undecodable frame");
                let _ = out_tx.send(ServerMessage::Error {
                    message: "invalid message".to_string(),
                });
            }
        }
    }

    info!("client disconnected");
    send_task.abort();
}

/// Mark the request as newest of its kind and run it in its own task.
fn spawn_request(
    kind: RequestKind,
    body: RequestBody,
    state: AppState,
    out: UnboundedSender<ServerMessage>,
    current: CurrentRequests,
) {
    let request_id = body.request_id;
    current.begin(kind, request_id);
    tokio::spawn(async move {
        if let Err(error) = process_request(kind, body, &state, &out, &current).await {
            if current.is_current(kind, request_id) {
                let _ = out.send(ServerMessage::error_for(kind, request_id, error.to_string()));
            } else {
                debug!(request_id, "dropping error for superseded request");
            }
        }
    });
}

async fn process_request(
    kind: RequestKind,
    body: RequestBody,
    state: &AppState,
    out: &UnboundedSender<ServerMessage>,
    current: &CurrentRequests,
) -> Result<(), AnalysisError> {
    let request = body
        .into_request(kind, state.default_elo(kind))
        .map_err(|err| AnalysisError::InvalidRequest(err.to_string()))?;
    // Reject malformed positions before consuming any queue or pool slot.
    fen::validate(&request.fen)?;

    let request_id = request.request_id;
    let short_fen: String = request
        .fen
        .split(' ')
        .next()
        .unwrap_or("")
        .chars()
        .take(20)
        .collect();
    info!(request_id, kind = %kind, fen = %short_fen, "request received");

    let queue = state.queues.for_kind(kind).clone();
    let mut lease = {
        let _pending = queue.enter_pending();
        state.pool_for(kind).acquire().await
    };
    let _processing = queue.enter_processing();

    if !current.is_current(kind, request_id) {
        debug!(request_id, "superseded before dispatch; discarding");
        return Ok(());
    }

    // Forward streamed lines while the request is still the current one.
    let (partial_tx, mut partial_rx) = mpsc::unbounded_channel();
    let forward_out = out.clone();
    let forward_current = current.clone();
    let forward = tokio::spawn(async move {
        while let Some(line) = partial_rx.recv().await {
            if forward_current.is_current(kind, request_id) {
                let _ = forward_out.send(ServerMessage::info_for(request_id, &line));
            }
        }
    });

    let started = Instant::now();
    let outcome = run_analysis(&mut *lease, &request, Some(&partial_tx)).await;
    drop(partial_tx);
    let _ = forward.await;
    // Release (or discard and replace) the engine before reporting back.
    drop(lease);

    let outcome = outcome?;
    if current.is_current(kind, request_id) {
        info!(
            request_id,
            best = %outcome.best_move,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request complete"
        );
        let _ = out.send(ServerMessage::result_for(kind, request_id, outcome));
    } else {
        debug!(request_id, "discarding result for superseded request");
    }
    Ok(())
}
