//! Handlers for book-scoped job endpoints (`/books/{book_id}/jobs`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hailango_core::job::{JobId, JobKind};
use hailango_core::media::JobInput;
use hailango_core::types::BookId;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub kind: JobKind,
    /// One input per page, in page order starting at page 1.
    pub inputs: Vec<JobInput>,
}

#[derive(Debug, Serialize)]
pub struct BatchCreated {
    pub book_id: BookId,
    pub total: usize,
    pub job_ids: Vec<JobId>,
}

/// POST /api/v1/books/{book_id}/jobs/batch
///
/// Create one job per page. The whole batch is rejected if any input is
/// invalid or of the wrong kind.
pub async fn create_batch(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(book_id): Path<BookId>,
    Json(input): Json<BatchRequest>,
) -> AppResult<impl IntoResponse> {
    let job_ids = state
        .jobs
        .batch_create(auth.user_id, book_id, input.kind, input.inputs)
        .await?;

    let created = BatchCreated {
        book_id,
        total: job_ids.len(),
        job_ids,
    };
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: created })))
}

/// GET /api/v1/books/{book_id}/jobs
///
/// The caller's jobs for a book, in creation order.
pub async fn list_book_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(book_id): Path<BookId>,
) -> AppResult<impl IntoResponse> {
    let jobs = state
        .jobs
        .get_book_jobs_for_user(auth.user_id, book_id)
        .await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/books/{book_id}/jobs/statistics
pub async fn book_statistics(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(book_id): Path<BookId>,
) -> AppResult<impl IntoResponse> {
    let stats = state
        .jobs
        .statistics_for_book(auth.user_id, book_id)
        .await?;
    Ok(Json(DataResponse { data: stats }))
}
