use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use imgq_core::types::ClientId;
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::ws::heartbeat::{Heartbeat, PING_TEXT};
use crate::ws::registry::LiveChannel;

/// HTTP handler that upgrades the connection to a push channel for
/// `client_id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let client_id = ClientId::from(client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// One task owns the socket and multiplexes three sources:
///   1. Messages the notifier routes to this connection.
///   2. Inbound frames, each of which acknowledges the heartbeat.
///   3. The heartbeat ticker, which pings the client and enforces the
///      silence limit.
///
/// Any send error, Close frame, or heartbeat expiry ends the connection;
/// the registration is then removed. Jobs are never cancelled here.
async fn handle_socket(socket: WebSocket, client_id: ClientId, state: AppState) {
    let conn_id = uuid::Uuid::new_v4();
    tracing::info!(client_id = %client_id, conn_id = %conn_id, "WebSocket connected");

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .notifier
        .register(client_id.clone(), LiveChannel::new(conn_id, tx));

    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = Heartbeat::new(state.config.heartbeat);
    let mut ticker = heartbeat.ticker();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(msg) = outbound else { break };
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!(client_id = %client_id, error = %e, "WebSocket send failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => heartbeat.ack(),
                Some(Err(e)) => {
                    tracing::debug!(client_id = %client_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            _ = ticker.tick() => {
                if heartbeat.is_expired() {
                    tracing::info!(client_id = %client_id, "Heartbeat not acknowledged, closing");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if let Err(e) = sink.send(Message::Text(PING_TEXT.into())).await {
                    tracing::debug!(client_id = %client_id, error = %e, "Heartbeat send failed");
                    break;
                }
            }
        }
    }

    state.notifier.unregister(client_id.clone(), conn_id);
    tracing::info!(client_id = %client_id, conn_id = %conn_id, "WebSocket disconnected");
}
