use std::sync::Arc;

use hailango_events::Hub;
use hailango_pipeline::JobService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (JWT secret, timeouts).
    pub config: Arc<ServerConfig>,
    /// Notification hub shared with the job engine.
    pub hub: Arc<Hub>,
    /// Job engine: creation, status polling, statistics.
    pub jobs: Arc<JobService>,
}
