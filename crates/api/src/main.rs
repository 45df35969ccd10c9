use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hailango_events::{start_monitor, Hub};
use hailango_pipeline::{InMemoryJobStore, JobService, JobStore, MediaBackend, SimulatedBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hailango_api::config::ServerConfig;
use hailango_api::router::build_app_router;
use hailango_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hailango_api=debug,hailango_pipeline=debug,hailango_events=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Notification hub ---
    let hub = Arc::new(Hub::new(config.hub.clone()));
    let monitor_handle = start_monitor(Arc::clone(&hub));
    tracing::info!(
        queue_capacity = config.hub.queue_capacity,
        ping_interval_secs = config.hub.ping_interval.as_secs(),
        "Notification hub started",
    );

    // --- Job engine ---
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let backend: Arc<dyn MediaBackend> =
        Arc::new(SimulatedBackend::new(config.simulation.clone()));
    let jobs = Arc::new(JobService::new(store, backend, Arc::clone(&hub)));
    tracing::info!(
        failure_rate = config.simulation.failure_rate,
        "Job engine started with simulated backend",
    );

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let config = Arc::new(config);

    let state = AppState {
        config: Arc::clone(&config),
        hub: Arc::clone(&hub),
        jobs: Arc::clone(&jobs),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Upgraded WebSocket connections keep the server alive until the hub
    // closes them, so the hub shuts down as soon as the signal arrives.
    let signal_hub = Arc::clone(&hub);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let ws_count = signal_hub.total_connection_count().await;
            tracing::info!(ws_count, "Closing WebSocket connections");
            signal_hub.shutdown().await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    if jobs.shutdown(shutdown_timeout).await {
        tracing::info!("In-flight jobs finished");
    }

    let _ = tokio::time::timeout(Duration::from_secs(5), monitor_handle).await;
    tracing::info!("Hub monitor stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
