pub mod books;
pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                   WebSocket upgrade (?token= or Bearer)
/// /ws/stats                             connected users and connections (GET)
/// /ws/connections                       caller's live connections (GET)
///
/// /jobs                                 create job (POST, 202)
/// /jobs/statistics                      caller's job counts (GET)
/// /jobs/{id}                            job snapshot (GET)
///
/// /books/{book_id}/jobs                 caller's jobs for the book (GET)
/// /books/{book_id}/jobs/batch           one job per page (POST, 202)
/// /books/{book_id}/jobs/statistics      caller's job counts for the book (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint and hub counters.
        .route("/ws", get(ws::ws_handler))
        .route("/ws/stats", get(handlers::ws_stats::ws_stats))
        .route("/ws/connections", get(handlers::ws_stats::my_connections))
        // Media jobs.
        .nest("/jobs", jobs::router())
        .nest("/books/{book_id}/jobs", books::router())
}
