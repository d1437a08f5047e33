// SPDX-License-Identifier: MIT

//! WebSocket upgrade routes: `/ws/worker/<id>`, `/ws/client/<id>`,
//! `/ws/monitor/<id>`. Each upgrade registers a connection with the
//! Connection Manager, spawns a writer task draining its outbound
//! lanes, and reads inbound frames into the Message Handler until the
//! socket closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use jobmesh_core::{Clock, ConnectionKind};
use jobmesh_store::Sss;
use jobmesh_wire::Envelope;
use tracing::{debug, warn};

use crate::cm::ReassemblyBuffer;
use crate::mh;
use crate::state::AppState;

/// Partial chunk sets older than this are dropped rather than held
/// forever by a peer that never finishes sending its fragments.
const CHUNK_MAX_AGE_MS: i64 = 60_000;

pub fn router<S: Sss + 'static, C: Clock + 'static>() -> Router<AppState<S, C>> {
    Router::new()
        .route("/ws/worker/:id", get(upgrade_worker::<S, C>))
        .route("/ws/client/:id", get(upgrade_client::<S, C>))
        .route("/ws/monitor/:id", get(upgrade_monitor::<S, C>))
}

async fn upgrade_worker<S: Sss + 'static, C: Clock + 'static>(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState<S, C>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ConnectionKind::Worker, id))
}

async fn upgrade_client<S: Sss + 'static, C: Clock + 'static>(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState<S, C>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ConnectionKind::Client, id))
}

async fn upgrade_monitor<S: Sss + 'static, C: Clock + 'static>(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState<S, C>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ConnectionKind::Monitor, id))
}

async fn handle_socket<S: Sss + 'static, C: Clock + 'static>(
    socket: WebSocket,
    state: AppState<S, C>,
    kind: ConnectionKind,
    id: String,
) {
    let now = state.clock.epoch_ms();
    let (conn, mut outbound_rx) = state.cm.register(kind, id.clone(), now).await;
    let (mut sink, mut stream) = socket.split();

    let writer_conn = conn.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            match writer_conn.next_outbound(&mut outbound_rx).await {
                Some(envelope) => {
                    let Ok(json) = serde_json::to_string(&envelope) else { continue };
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    });

    let reassembly = ReassemblyBuffer::new(CHUNK_MAX_AGE_MS);

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        conn.mark_activity(state.clock.epoch_ms());
                        let envelope: Envelope = match serde_json::from_str(&text) {
                            Ok(e) => e,
                            Err(e) => { warn!(%id, error = %e, "malformed envelope"); continue; }
                        };
                        let Some(envelope) = reassembly.accept(envelope, state.clock.epoch_ms()) else {
                            continue;
                        };
                        if let Some(reply) = mh::handle(&state, kind, &id, envelope.payload).await {
                            state.cm.send_to(kind, &id, reply, state.clock.epoch_ms()).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => { debug!(%id, error = %e, "websocket read error"); break; }
                }
            }
            _ = &mut writer => break,
        }
    }

    state.cm.unregister(kind, &id).await;
    writer.abort();
}
