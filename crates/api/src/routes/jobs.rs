//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> create_job
/// GET    /statistics      -> get_statistics
/// GET    /languages/{kind} -> list_languages
/// GET    /{id}            -> get_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::create_job))
        .route("/statistics", get(jobs::get_statistics))
        .route("/languages/{kind}", get(jobs::list_languages))
        .route("/{id}", get(jobs::get_job))
}
