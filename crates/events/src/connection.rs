//! Per-connection state shared between the hub and the socket pumps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use hailango_core::types::{Timestamp, UserId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::message::Message;

/// Marker stored in `overflow_since` when the queue is not overflowing.
const NOT_OVERFLOWING: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Close reasons and state
// ---------------------------------------------------------------------------

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client sent a close frame.
    ClientClosed,
    /// The socket failed or reached end of stream without a close frame.
    ConnectionLost,
    /// A frame could not be written within the write timeout.
    WriteFailed,
    /// The outbound queue stayed full past the backpressure grace window.
    Unresponsive,
    /// No inbound frame arrived within the pong timeout.
    HeartbeatTimeout,
    /// The server is shutting down.
    ServerShutdown,
}

impl CloseReason {
    /// WebSocket close code to send, or `None` when the socket is unusable.
    pub fn close_code(self) -> Option<u16> {
        match self {
            Self::ClientClosed => Some(1000),
            Self::ServerShutdown | Self::HeartbeatTimeout => Some(1001),
            Self::Unresponsive => Some(1008),
            Self::ConnectionLost | Self::WriteFailed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ConnectionLost => "connection_lost",
            Self::WriteFailed => "write_failed",
            Self::Unresponsive => "unresponsive",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Traffic seen within the last ping interval.
    Active,
    /// Registered but quiet for longer than the ping interval.
    Idle,
    /// Unregistered; the pumps are draining or gone.
    Closed,
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ConnectionShared {
    id: ConnectionId,
    user_id: UserId,
    connected_at: Timestamp,
    /// Monotonic origin for the millisecond counters below.
    opened_at: Instant,
    last_activity_ms: AtomicU64,
    overflow_since_ms: AtomicU64,
    close_reason: OnceLock<CloseReason>,
    closed: CancellationToken,
}

/// Cheaply clonable handle to one connection.
///
/// The hub keeps one clone in its registry; the read and write pumps each
/// hold another. Cancelling [`closed`](Self::closed) tells both pumps to
/// exit.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<ConnectionShared>);

impl ConnectionHandle {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self(Arc::new(ConnectionShared {
            id: ConnectionId::new(),
            user_id,
            connected_at: chrono::Utc::now(),
            opened_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            overflow_since_ms: AtomicU64::new(NOT_OVERFLOWING),
            close_reason: OnceLock::new(),
            closed: CancellationToken::new(),
        }))
    }

    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    pub fn user_id(&self) -> UserId {
        self.0.user_id
    }

    pub fn connected_at(&self) -> Timestamp {
        self.0.connected_at
    }

    /// Record inbound traffic (any frame, including pongs).
    pub fn touch(&self) {
        self.0
            .last_activity_ms
            .store(self.elapsed_ms(Instant::now()), Ordering::Relaxed);
    }

    /// Time since the last inbound frame, or since registration.
    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        let last = self.0.last_activity_ms.load(Ordering::Relaxed);
        std::time::Duration::from_millis(self.elapsed_ms(now).saturating_sub(last))
    }

    /// Mark the outbound queue as full. Keeps the earliest mark.
    pub(crate) fn mark_overflow(&self, now: Instant) {
        let _ = self.0.overflow_since_ms.compare_exchange(
            NOT_OVERFLOWING,
            self.elapsed_ms(now),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    pub(crate) fn clear_overflow(&self) {
        self.0
            .overflow_since_ms
            .store(NOT_OVERFLOWING, Ordering::Relaxed);
    }

    /// How long the queue has been continuously full, if it is.
    pub(crate) fn overflowing_for(&self, now: Instant) -> Option<std::time::Duration> {
        match self.0.overflow_since_ms.load(Ordering::Relaxed) {
            NOT_OVERFLOWING => None,
            since => Some(std::time::Duration::from_millis(
                self.elapsed_ms(now).saturating_sub(since),
            )),
        }
    }

    /// Record why the connection closed and signal the pumps.
    ///
    /// Only the first reason sticks; later calls just re-cancel.
    pub(crate) fn close(&self, reason: CloseReason) {
        let _ = self.0.close_reason.set(reason);
        self.0.closed.cancel();
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.0.close_reason.get().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.is_cancelled()
    }

    /// Token cancelled when the connection is unregistered.
    pub fn closed(&self) -> &CancellationToken {
        &self.0.closed
    }

    pub fn state(&self, now: Instant, ping_interval: std::time::Duration) -> ConnectionState {
        if self.is_closed() {
            ConnectionState::Closed
        } else if self.idle_for(now) > ping_interval {
            ConnectionState::Idle
        } else {
            ConnectionState::Active
        }
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.0.opened_at).as_millis() as u64
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.0.id)
            .field("user_id", &self.0.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registration and introspection
// ---------------------------------------------------------------------------

/// Returned by [`Hub::register`](crate::Hub::register).
///
/// `outbound` yields messages in the order they were enqueued and returns
/// `None` once the connection is unregistered.
#[derive(Debug)]
pub struct Registration {
    pub handle: ConnectionHandle,
    pub outbound: mpsc::Receiver<Arc<Message>>,
}

/// Snapshot of one connection for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub connected_at: Timestamp,
    pub state: ConnectionState,
    /// Messages waiting in the outbound queue.
    pub queued: usize,
}
