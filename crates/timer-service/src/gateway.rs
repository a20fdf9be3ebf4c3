//! WebSocket gateway.
//!
//! `GET /ws?sessionId=<id>` upgrades to a WebSocket and joins the new
//! connection to the session. Each socket is split into a writer task that
//! serializes [`ServerEvent`]s from the connection's outbound sink, and a
//! reader task that parses client frames and forwards them to the session
//! actor. When either side finishes the connection leaves its session.
//!
//! A socket whose join is refused because the session id is missing or
//! invalid stays open but unjoined; its frames are read and ignored. Any
//! other join failure closes the socket with a client-safe reason.

use crate::actors::{JoinResult, SessionControllerActorHandle};
use crate::errors::TimerError;
use crate::observability::metrics as prom;
use crate::protocol::{parse_client_frame, ServerEvent};

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::types::{ConnectionId, SessionId};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

/// Capacity of the per-socket outbound event queue.
const OUTBOUND_BUFFER: usize = 64;

/// Query parameters supplied with the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Build the WebSocket router.
pub fn ws_router(controller: SessionControllerActorHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(controller): State<SessionControllerActorHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params.session_id, controller))
}

#[instrument(skip_all, name = "timer.gateway", fields(connection_id = tracing::field::Empty))]
async fn handle_socket(
    socket: WebSocket,
    session_id: Option<String>,
    controller: SessionControllerActorHandle,
) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", connection_id.as_str());

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    let session_id = SessionId::from(session_id.unwrap_or_default());
    let joined = controller
        .join(session_id.clone(), connection_id.clone(), outbound_tx)
        .await;

    let JoinResult { session, .. } = match joined {
        Ok(result) => result,
        Err(TimerError::InvalidSessionId(reason)) => {
            warn!(
                target: "timer.gateway",
                connection_id = %connection_id,
                reason = %reason,
                "Connection has no valid session id, leaving it unjoined"
            );
            drain_unjoined(&connection_id, ws_rx).await;
            return;
        }
        Err(e) => {
            warn!(
                target: "timer.gateway",
                connection_id = %connection_id,
                session_id = %session_id,
                error = %e,
                "Join refused, closing socket"
            );
            let frame = CloseFrame {
                code: close_code::AGAIN,
                reason: e.client_message().into(),
            };
            let _ = ws_tx.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    info!(
        target: "timer.gateway",
        connection_id = %connection_id,
        session_id = %session_id,
        "WebSocket client joined"
    );

    let writer_connection = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        target: "timer.gateway",
                        connection_id = %writer_connection,
                        event = event.name(),
                        error = %e,
                        "Failed to serialize event"
                    );
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_connection = connection_id.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let started = Instant::now();
                    match parse_client_frame(&text) {
                        Ok(command) => {
                            let name = command.name();
                            if let Err(e) =
                                session.command(reader_connection.clone(), command).await
                            {
                                debug!(
                                    target: "timer.gateway",
                                    connection_id = %reader_connection,
                                    error = %e,
                                    "Session unreachable, stopping reader"
                                );
                                break;
                            }
                            prom::record_message_latency(name, started.elapsed());
                        }
                        Err(e) => {
                            prom::record_command("unparsed", e.metric_label());
                            debug!(
                                target: "timer.gateway",
                                connection_id = %reader_connection,
                                error = %e,
                                "Ignoring malformed frame"
                            );
                        }
                    }
                }
                Message::Close(_) => break,
                // axum answers pings itself
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    match controller.leave(connection_id.clone()).await {
        Ok(result) => {
            info!(
                target: "timer.gateway",
                connection_id = %connection_id,
                session_id = %result.session_id,
                remaining_members = result.remaining_members,
                session_destroyed = result.session_destroyed,
                "WebSocket client left"
            );
        }
        Err(e) => {
            debug!(
                target: "timer.gateway",
                connection_id = %connection_id,
                error = %e,
                "Leave after disconnect failed"
            );
        }
    }
}

/// Read and discard frames from a socket that never joined a session.
async fn drain_unjoined(connection_id: &ConnectionId, mut ws_rx: SplitStream<WebSocket>) {
    let mut ignored: u64 = 0;
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => ignored += 1,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    debug!(
        target: "timer.gateway",
        connection_id = %connection_id,
        ignored,
        "Unjoined WebSocket client disconnected"
    );
}
