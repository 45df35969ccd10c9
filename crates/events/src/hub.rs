//! Process-wide registry of live connections with fan-out delivery.
//!
//! [`Hub`] maps each user to the set of connections they have open (one per
//! device or tab). Producers call [`Hub::send_to_user`] or
//! [`Hub::broadcast`]; neither ever blocks on a slow client. Each connection
//! has a bounded outbound queue and delivery uses `try_send`. A queue that
//! stays full past the backpressure grace window gets its connection evicted.
//!
//! Designed to be shared via `Arc<Hub>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hailango_core::types::UserId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::{
    CloseReason, ConnectionHandle, ConnectionId, ConnectionInfo, Registration,
};
use crate::message::Message;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Outbound queue capacity per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Interval between server pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);

/// Silence after which a connection is considered dead.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for writing one frame.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a queue may stay full before its connection is evicted.
pub const DEFAULT_BACKPRESSURE_GRACE: Duration = Duration::from_secs(2);

/// How often the monitor sweeps for dead connections.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Largest inbound frame accepted.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub queue_capacity: usize,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
    pub backpressure_grace: Duration,
    pub sweep_interval: Duration,
    pub max_message_bytes: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            backpressure_grace: DEFAULT_BACKPRESSURE_GRACE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Hub is shutting down")]
    ShuttingDown,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct Peer {
    handle: ConnectionHandle,
    sender: mpsc::Sender<Arc<Message>>,
}

/// Outcome of offering one message to one connection.
enum Delivery {
    Sent,
    Dropped,
    Evict(CloseReason),
}

pub struct Hub {
    config: HubConfig,
    connections: RwLock<HashMap<UserId, HashMap<ConnectionId, Peer>>>,
    accepting: AtomicBool,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Cancelled once [`shutdown`](Self::shutdown) starts.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // -- registration ------------------------------------------------------

    /// Register a new connection for `user_id`.
    ///
    /// Returns the handle shared with the pumps and the receiving end of the
    /// connection's outbound queue.
    pub async fn register(&self, user_id: UserId) -> Result<Registration, HubError> {
        let mut conns = self.connections.write().await;
        // Checked under the write lock so shutdown's drain cannot miss us.
        if !self.accepting.load(Ordering::Acquire) {
            return Err(HubError::ShuttingDown);
        }

        let (sender, outbound) = mpsc::channel(self.config.queue_capacity);
        let handle = ConnectionHandle::new(user_id);
        conns.entry(user_id).or_default().insert(
            handle.id(),
            Peer {
                handle: handle.clone(),
                sender,
            },
        );
        let user_connections = conns.get(&user_id).map_or(0, HashMap::len);
        drop(conns);

        tracing::info!(
            user_id = %user_id,
            conn_id = %handle.id(),
            user_connections,
            "WebSocket connection registered",
        );
        Ok(Registration { handle, outbound })
    }

    /// Remove a connection. Idempotent.
    ///
    /// Closes the outbound queue and cancels the connection token so both
    /// pumps exit. Returns `true` if this call removed the connection.
    pub async fn unregister(&self, handle: &ConnectionHandle, reason: CloseReason) -> bool {
        let removed = {
            let mut conns = self.connections.write().await;
            let user_id = handle.user_id();
            let removed = conns
                .get_mut(&user_id)
                .and_then(|peers| peers.remove(&handle.id()));
            if conns.get(&user_id).is_some_and(HashMap::is_empty) {
                conns.remove(&user_id);
            }
            removed
        };

        handle.close(reason);

        match removed {
            Some(_peer) => {
                tracing::info!(
                    user_id = %handle.user_id(),
                    conn_id = %handle.id(),
                    reason = %handle.close_reason().unwrap_or(reason),
                    "WebSocket connection unregistered",
                );
                true
            }
            None => false,
        }
    }

    // -- delivery ----------------------------------------------------------

    /// Enqueue `message` on every live connection of `user_id`.
    ///
    /// Never fails and never blocks. Returns the number of connections the
    /// message was enqueued on; zero when the user has no connections.
    pub async fn send_to_user(&self, user_id: UserId, message: impl Into<Arc<Message>>) -> usize {
        let message = message.into();
        let now = Instant::now();
        let mut evictions = Vec::new();
        let mut sent = 0;

        {
            let conns = self.connections.read().await;
            if let Some(peers) = conns.get(&user_id) {
                for peer in peers.values() {
                    match self.deliver(peer, &message, now) {
                        Delivery::Sent => sent += 1,
                        Delivery::Dropped => {}
                        Delivery::Evict(reason) => evictions.push((peer.handle.clone(), reason)),
                    }
                }
            }
        }

        self.evict(evictions).await;
        sent
    }

    /// Enqueue `message` on a single connection. Returns `true` if enqueued.
    pub async fn send_to_connection(
        &self,
        handle: &ConnectionHandle,
        message: impl Into<Arc<Message>>,
    ) -> bool {
        let message = message.into();
        let outcome = {
            let conns = self.connections.read().await;
            conns
                .get(&handle.user_id())
                .and_then(|peers| peers.get(&handle.id()))
                .map(|peer| self.deliver(peer, &message, Instant::now()))
        };

        match outcome {
            Some(Delivery::Sent) => true,
            Some(Delivery::Evict(reason)) => {
                self.unregister(handle, reason).await;
                false
            }
            Some(Delivery::Dropped) | None => false,
        }
    }

    /// Enqueue `message` on every connection of every user.
    pub async fn broadcast(&self, message: impl Into<Arc<Message>>) -> usize {
        let message = message.into();
        let now = Instant::now();
        let mut evictions = Vec::new();
        let mut sent = 0;

        {
            let conns = self.connections.read().await;
            for peer in conns.values().flat_map(HashMap::values) {
                match self.deliver(peer, &message, now) {
                    Delivery::Sent => sent += 1,
                    Delivery::Dropped => {}
                    Delivery::Evict(reason) => evictions.push((peer.handle.clone(), reason)),
                }
            }
        }

        self.evict(evictions).await;
        sent
    }

    fn deliver(&self, peer: &Peer, message: &Arc<Message>, now: Instant) -> Delivery {
        match peer.sender.try_send(Arc::clone(message)) {
            Ok(()) => {
                peer.handle.clear_overflow();
                Delivery::Sent
            }
            Err(TrySendError::Full(_)) => {
                peer.handle.mark_overflow(now);
                let full_for = peer.handle.overflowing_for(now).unwrap_or_default();
                if full_for >= self.config.backpressure_grace {
                    Delivery::Evict(CloseReason::Unresponsive)
                } else {
                    tracing::warn!(
                        user_id = %peer.handle.user_id(),
                        conn_id = %peer.handle.id(),
                        message_type = message.kind.as_str(),
                        full_for_ms = full_for.as_millis() as u64,
                        "Outbound queue full, message dropped",
                    );
                    Delivery::Dropped
                }
            }
            Err(TrySendError::Closed(_)) => Delivery::Evict(CloseReason::ConnectionLost),
        }
    }

    async fn evict(&self, evictions: Vec<(ConnectionHandle, CloseReason)>) {
        for (handle, reason) in evictions {
            if self.unregister(&handle, reason).await {
                tracing::warn!(
                    user_id = %handle.user_id(),
                    conn_id = %handle.id(),
                    reason = %reason,
                    "Evicted WebSocket connection",
                );
            }
        }
    }

    // -- counters ----------------------------------------------------------

    pub async fn connected_user_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn total_connection_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .map(HashMap::len)
            .sum()
    }

    pub async fn is_user_connected(&self, user_id: UserId) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    /// Describe every live connection of `user_id`, oldest first.
    pub async fn connections_for_user(&self, user_id: UserId) -> Vec<ConnectionInfo> {
        let now = Instant::now();
        let conns = self.connections.read().await;
        let mut infos: Vec<ConnectionInfo> = conns
            .get(&user_id)
            .map(|peers| {
                peers
                    .values()
                    .map(|peer| ConnectionInfo {
                        id: peer.handle.id(),
                        connected_at: peer.handle.connected_at(),
                        state: peer.handle.state(now, self.config.ping_interval),
                        queued: self.config.queue_capacity - peer.sender.capacity(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }

    // -- maintenance -------------------------------------------------------

    /// Evict connections that are unresponsive or silent for too long.
    ///
    /// A queue still full past the backpressure grace window evicts with
    /// [`CloseReason::Unresponsive`]; no inbound traffic for longer than the
    /// pong timeout evicts with [`CloseReason::HeartbeatTimeout`]. Returns
    /// the number of connections evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut evictions = Vec::new();

        {
            let conns = self.connections.read().await;
            for peer in conns.values().flat_map(HashMap::values) {
                let handle = &peer.handle;
                if peer.sender.capacity() == 0 {
                    handle.mark_overflow(now);
                    let full_for = handle.overflowing_for(now).unwrap_or_default();
                    if full_for >= self.config.backpressure_grace {
                        evictions.push((handle.clone(), CloseReason::Unresponsive));
                        continue;
                    }
                } else {
                    handle.clear_overflow();
                }

                if handle.idle_for(now) > self.config.pong_timeout {
                    evictions.push((handle.clone(), CloseReason::HeartbeatTimeout));
                }
            }
        }

        let count = evictions.len();
        self.evict(evictions).await;
        count
    }

    /// Stop accepting registrations and close every connection.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        self.shutdown.cancel();

        let drained: Vec<Peer> = {
            let mut conns = self.connections.write().await;
            conns
                .drain()
                .flat_map(|(_, peers)| peers.into_values())
                .collect()
        };

        let count = drained.len();
        for peer in drained {
            peer.handle.close(CloseReason::ServerShutdown);
        }
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
