use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use hailango_core::types::UserId;
use hailango_events::{CloseReason, Hub, Message, Registration};

use crate::middleware::auth::WsAuthUser;
use crate::state::AppState;
use crate::ws::pump::{read_pump, write_pump};

/// GET /api/v1/ws
///
/// Authenticates the caller, then upgrades the connection to WebSocket.
/// Unauthenticated requests are rejected with 401 before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    user: WsAuthUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let max_message_bytes = state.hub.config().max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, user.user_id, state.hub))
}

/// Manage a single WebSocket connection after upgrade.
///
///   1. Registers the connection with the hub.
///   2. Queues the `connection_established` greeting.
///   3. Spawns the write pump and runs the read pump on the current task.
///   4. Waits for the write pump so the close frame is flushed.
async fn handle_socket(mut socket: WebSocket, user_id: UserId, hub: Arc<Hub>) {
    let Registration { handle, outbound } = match hub.register(user_id).await {
        Ok(registration) => registration,
        Err(e) => {
            tracing::info!(user_id = %user_id, error = %e, "Rejecting WebSocket connection");
            let reason = CloseReason::ServerShutdown;
            let frame = reason.close_code().map(|code| CloseFrame {
                code,
                reason: reason.as_str().into(),
            });
            let _ = socket.send(WsMessage::Close(frame)).await;
            return;
        }
    };

    hub.send_to_connection(&handle, Message::connection_established(user_id, handle.id()))
        .await;

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(
        sink,
        outbound,
        handle.clone(),
        Arc::clone(&hub),
    ));
    read_pump(stream, handle.clone(), hub).await;

    if let Err(e) = writer.await {
        tracing::error!(conn_id = %handle.id(), error = %e, "WebSocket write pump failed");
    }
    tracing::debug!(
        conn_id = %handle.id(),
        reason = ?handle.close_reason(),
        "WebSocket connection finished",
    );
}
