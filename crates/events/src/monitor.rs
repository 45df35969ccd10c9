use std::sync::Arc;

use crate::hub::Hub;

/// Spawn the background task that periodically sweeps the hub for
/// unresponsive and heartbeat-timed-out connections.
///
/// The task runs every `sweep_interval` until [`Hub::shutdown`] is called.
/// The returned `JoinHandle` can be awaited after shutdown to make sure the
/// sweep has stopped.
pub fn start_monitor(hub: Arc<Hub>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(hub.config().sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let shutdown = hub.shutdown_token().clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let evicted = hub.sweep().await;
                    if evicted > 0 {
                        let remaining = hub.total_connection_count().await;
                        tracing::debug!(evicted, remaining, "WebSocket monitor sweep");
                    }
                }
            }
        }

        tracing::info!("WebSocket monitor stopped");
    })
}
