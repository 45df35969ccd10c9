//! Route definitions for book-scoped jobs.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::books;
use crate::state::AppState;

/// Routes mounted at `/books/{book_id}/jobs`.
///
/// ```text
/// GET    /                -> list_book_jobs
/// POST   /batch           -> create_batch
/// GET    /statistics      -> book_statistics
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(books::list_book_jobs))
        .route("/batch", post(books::create_batch))
        .route("/statistics", get(books::book_statistics))
}
