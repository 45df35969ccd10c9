//! Tests for the WebSocket read and write pumps.
//!
//! The pumps run against `futures` channels standing in for the socket
//! halves, so no network is involved.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message as WsMessage;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use hailango_api::ws::pump::{read_pump, write_pump};
use hailango_events::{CloseReason, Hub, HubConfig, Message};
use tokio::time::Instant;
use uuid::Uuid;

type Inbound = Result<WsMessage, std::io::Error>;

fn hub_with_ping(ping_interval: Duration) -> Arc<Hub> {
    Arc::new(Hub::new(HubConfig {
        ping_interval,
        pong_timeout: ping_interval * 2,
        ..HubConfig::default()
    }))
}

fn text_json(frame: WsMessage) -> serde_json::Value {
    match frame {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

fn outbound_json(msg: Arc<Message>) -> serde_json::Value {
    serde_json::to_value(&*msg).unwrap()
}

// ---------------------------------------------------------------------------
// Test: write pump forwards queued messages in order, then closes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn write_pump_forwards_in_order_and_sends_close_frame() {
    let hub = Arc::new(Hub::default());
    let user = Uuid::new_v4();
    let registration = hub.register(user).await.unwrap();
    let handle = registration.handle.clone();

    hub.send_to_user(user, Message::pong()).await;
    hub.send_to_user(user, Message::error("E1", "first")).await;

    let (sink, mut frames) = mpsc::channel::<WsMessage>(16);
    let pump = tokio::spawn(write_pump(
        sink,
        registration.outbound,
        handle.clone(),
        Arc::clone(&hub),
    ));

    assert_eq!(text_json(frames.next().await.unwrap())["type"], "pong");
    assert_eq!(text_json(frames.next().await.unwrap())["type"], "error");

    hub.unregister(&handle, CloseReason::ServerShutdown).await;
    pump.await.unwrap();

    match frames.next().await {
        Some(WsMessage::Close(Some(frame))) => {
            assert_eq!(frame.code, 1001);
            assert_eq!(frame.reason.as_str(), "server_shutdown");
        }
        other => panic!("expected a close frame, got {other:?}"),
    }
    assert!(!hub.is_user_connected(user).await);
}

// ---------------------------------------------------------------------------
// Test: write pump pings on the ping interval
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn write_pump_sends_pings() {
    let hub = hub_with_ping(Duration::from_secs(5));
    let registration = hub.register(Uuid::new_v4()).await.unwrap();
    let handle = registration.handle.clone();

    let (sink, mut frames) = mpsc::channel::<WsMessage>(16);
    let pump = tokio::spawn(write_pump(
        sink,
        registration.outbound,
        handle.clone(),
        Arc::clone(&hub),
    ));

    let started = Instant::now();
    assert!(matches!(frames.next().await, Some(WsMessage::Ping(_))));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(matches!(frames.next().await, Some(WsMessage::Ping(_))));

    hub.unregister(&handle, CloseReason::ClientClosed).await;
    pump.await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: a failed write unregisters the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn write_failure_unregisters() {
    let hub = Arc::new(Hub::default());
    let user = Uuid::new_v4();
    let registration = hub.register(user).await.unwrap();
    let handle = registration.handle.clone();

    let (sink, frames) = mpsc::channel::<WsMessage>(16);
    drop(frames);

    let pump = tokio::spawn(write_pump(
        sink,
        registration.outbound,
        handle.clone(),
        Arc::clone(&hub),
    ));
    hub.send_to_user(user, Message::pong()).await;
    pump.await.unwrap();

    assert_eq!(handle.close_reason(), Some(CloseReason::WriteFailed));
    assert!(!hub.is_user_connected(user).await);
}

// ---------------------------------------------------------------------------
// Test: read pump answers ping and malformed frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_pump_answers_ping_and_reports_bad_json() {
    let hub = Arc::new(Hub::default());
    let user = Uuid::new_v4();
    let mut registration = hub.register(user).await.unwrap();
    let handle = registration.handle.clone();

    let (mut client, stream) = mpsc::channel::<Inbound>(16);
    let pump = tokio::spawn(read_pump(stream, handle.clone(), Arc::clone(&hub)));

    client
        .send(Ok(WsMessage::Text(r#"{"type":"ping"}"#.into())))
        .await
        .unwrap();
    let reply = outbound_json(registration.outbound.recv().await.unwrap());
    assert_eq!(reply["type"], "pong");

    client
        .send(Ok(WsMessage::Text("not json".into())))
        .await
        .unwrap();
    let reply = outbound_json(registration.outbound.recv().await.unwrap());
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["data"]["code"], "INVALID_MESSAGE");

    // Unknown types are ignored.
    client
        .send(Ok(WsMessage::Text(r#"{"type":"subscribe","data":{}}"#.into())))
        .await
        .unwrap();

    client.send(Ok(WsMessage::Close(None))).await.unwrap();
    pump.await.unwrap();

    assert_eq!(handle.close_reason(), Some(CloseReason::ClientClosed));
    assert!(!hub.is_user_connected(user).await);
    assert!(registration.outbound.recv().await.is_none());
}

#[tokio::test]
async fn read_pump_end_of_stream_is_connection_lost() {
    let hub = Arc::new(Hub::default());
    let registration = hub.register(Uuid::new_v4()).await.unwrap();
    let handle = registration.handle.clone();

    let (client, stream) = mpsc::channel::<Inbound>(1);
    drop(client);

    read_pump(stream, handle.clone(), Arc::clone(&hub)).await;
    assert_eq!(handle.close_reason(), Some(CloseReason::ConnectionLost));
    assert_eq!(hub.total_connection_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn read_pump_refreshes_activity() {
    let hub = Arc::new(Hub::default());
    let registration = hub.register(Uuid::new_v4()).await.unwrap();
    let handle = registration.handle.clone();

    let (mut client, stream) = mpsc::channel::<Inbound>(4);
    let pump = tokio::spawn(read_pump(stream, handle.clone(), Arc::clone(&hub)));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(handle.idle_for(Instant::now()) >= Duration::from_secs(30));

    client.send(Ok(WsMessage::Pong(Bytes::new()))).await.unwrap();
    while handle.idle_for(Instant::now()) >= Duration::from_secs(30) {
        tokio::task::yield_now().await;
    }
    assert!(handle.idle_for(Instant::now()) < Duration::from_secs(1));

    drop(client);
    pump.await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: unregistering stops the read pump
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unregister_stops_read_pump() {
    let hub = Arc::new(Hub::default());
    let registration = hub.register(Uuid::new_v4()).await.unwrap();
    let handle = registration.handle.clone();

    // Keep the client side open so the stream never ends on its own.
    let (_client, stream) = mpsc::channel::<Inbound>(1);
    let pump = tokio::spawn(read_pump(stream, handle.clone(), Arc::clone(&hub)));

    hub.unregister(&handle, CloseReason::HeartbeatTimeout).await;
    tokio::time::timeout(Duration::from_secs(1), pump)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.close_reason(), Some(CloseReason::HeartbeatTimeout));
}
