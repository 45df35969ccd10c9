//! The two tasks that own a WebSocket connection.
//!
//! The write pump is the only writer and the read pump the only reader.
//! Both are generic over the sink and stream halves so they run against
//! in-memory channels in tests. Whichever pump exits first unregisters the
//! connection, which cancels the other.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage};
use futures::{Sink, SinkExt, Stream, StreamExt};
use hailango_events::{ClientFrame, CloseReason, ConnectionHandle, Hub, Message};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

// ---------------------------------------------------------------------------
// Write pump
// ---------------------------------------------------------------------------

/// Drain the outbound queue into `sink` and keep the peer alive with pings.
///
/// Exits when the connection is closed by the hub, the queue closes, or a
/// write fails or exceeds the write timeout. Sends a close frame when the
/// close reason has a code, then unregisters.
pub async fn write_pump<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Arc<Message>>,
    handle: ConnectionHandle,
    hub: Arc<Hub>,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let ping_interval = hub.config().ping_interval;
    let write_timeout = hub.config().write_timeout;
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;

            () = handle.closed().cancelled() => {
                break handle.close_reason().unwrap_or(CloseReason::ServerShutdown);
            }

            next = outbound.recv() => {
                let Some(message) = next else {
                    break handle.close_reason().unwrap_or(CloseReason::ConnectionLost);
                };
                let frame = match message.to_json() {
                    Ok(text) => WsMessage::Text(text.into()),
                    Err(e) => {
                        tracing::error!(conn_id = %handle.id(), error = %e, "Failed to serialize message");
                        continue;
                    }
                };
                if let Err(reason) = send_frame(&mut sink, frame, write_timeout, &handle).await {
                    break reason;
                }
            }

            _ = ping.tick() => {
                tracing::trace!(conn_id = %handle.id(), "WebSocket ping");
                let frame = WsMessage::Ping(Bytes::new());
                if let Err(reason) = send_frame(&mut sink, frame, write_timeout, &handle).await {
                    break reason;
                }
            }
        }
    };

    if let Some(code) = reason.close_code() {
        let frame = CloseFrame {
            code,
            reason: reason.as_str().into(),
        };
        // The peer may already be gone; the connection is closing either way.
        let close = WsMessage::Close(Some(frame));
        let _ = tokio::time::timeout(write_timeout, sink.send(close)).await;
    }
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;

    hub.unregister(&handle, reason).await;
}

async fn send_frame<S>(
    sink: &mut S,
    frame: WsMessage,
    limit: Duration,
    handle: &ConnectionHandle,
) -> Result<(), CloseReason>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(conn_id = %handle.id(), error = %e, "WebSocket write failed");
            Err(CloseReason::WriteFailed)
        }
        Err(_) => {
            tracing::warn!(
                conn_id = %handle.id(),
                timeout_ms = limit.as_millis() as u64,
                "WebSocket write timed out",
            );
            Err(CloseReason::WriteFailed)
        }
    }
}

// ---------------------------------------------------------------------------
// Read pump
// ---------------------------------------------------------------------------

/// Read frames from `stream` until the peer leaves or the connection closes.
///
/// Every frame refreshes the connection's activity clock. Text frames are
/// parsed as client messages: `ping` is answered with `pong`, malformed
/// JSON with an `error` message.
pub async fn read_pump<R, E>(mut stream: R, handle: ConnectionHandle, hub: Arc<Hub>)
where
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let reason = loop {
        let next = tokio::select! {
            biased;
            // Already unregistered by the hub or the write pump.
            () = handle.closed().cancelled() => return,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                handle.touch();
                match frame {
                    WsMessage::Text(text) => handle_text(&hub, &handle, text.as_str()).await,
                    WsMessage::Close(_) => break CloseReason::ClientClosed,
                    WsMessage::Pong(_) => {
                        tracing::trace!(conn_id = %handle.id(), "Pong received");
                    }
                    WsMessage::Ping(_) | WsMessage::Binary(_) => {}
                }
            }
            Some(Err(e)) => {
                tracing::debug!(conn_id = %handle.id(), error = %e, "WebSocket receive error");
                break CloseReason::ConnectionLost;
            }
            None => break CloseReason::ConnectionLost,
        }
    };

    hub.unregister(&handle, reason).await;
}

async fn handle_text(hub: &Hub, handle: &ConnectionHandle, text: &str) {
    match ClientFrame::parse(text) {
        Ok(frame) if frame.is_ping() => {
            hub.send_to_connection(handle, Message::pong()).await;
        }
        Ok(frame) => {
            tracing::debug!(conn_id = %handle.id(), kind = %frame.kind, "Ignoring client message");
        }
        Err(e) => {
            tracing::debug!(conn_id = %handle.id(), error = %e, "Malformed client message");
            hub.send_to_connection(
                handle,
                Message::error("INVALID_MESSAGE", format!("Malformed message: {e}")),
            )
            .await;
        }
    }
}
