//! Handlers for the `/jobs` resource.
//!
//! All endpoints require authentication via [`AuthUser`]. Users only see
//! their own jobs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hailango_core::error::CoreError;
use hailango_core::job::{Job, JobId, JobKind, JobStatus, NewJob};
use hailango_core::media::JobInput;
use hailango_core::types::BookId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID and verify the caller owns it.
async fn find_and_authorize(
    state: &AppState,
    job_id: JobId,
    auth: &AuthUser,
) -> AppResult<Job> {
    let job = state.jobs.get_job(job_id).await?;

    if job.owner_id != auth.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Cannot view another user's job".into(),
        )));
    }

    Ok(job)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub book_id: BookId,
    pub page_number: u32,
    pub input: JobInput,
}

/// Acknowledgement returned when a job is accepted.
#[derive(Debug, Serialize)]
pub struct CreatedJob {
    pub job_id: JobId,
    pub kind: JobKind,
    pub book_id: BookId,
    pub page_number: u32,
    pub status: JobStatus,
    pub progress: u8,
}

/// POST /api/v1/jobs
///
/// Accept a new OCR, TTS or STT job. Returns 202 as soon as the job is
/// stored; progress is pushed over the WebSocket and can be polled with
/// `GET /jobs/{id}`.
pub async fn create_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    let kind = input.input.kind();
    let job_id = state
        .jobs
        .create_job(NewJob {
            owner_id: auth.user_id,
            book_id: input.book_id,
            page_number: input.page_number,
            input: input.input,
        })
        .await?;

    let created = CreatedJob {
        job_id,
        kind,
        book_id: input.book_id,
        page_number: input.page_number,
        status: JobStatus::Pending,
        progress: 0,
    };
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: created })))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/statistics
///
/// Job counts per status for the caller.
pub async fn get_statistics(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let stats = state.jobs.statistics_for_user(auth.user_id).await?;
    Ok(Json(DataResponse { data: stats }))
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/languages/{kind}
///
/// Language catalogue for TTS or STT jobs. OCR has no catalogue.
pub async fn list_languages(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(kind): Path<JobKind>,
) -> AppResult<impl IntoResponse> {
    let languages = state.jobs.supported_languages(kind).ok_or_else(|| {
        AppError::BadRequest(format!("{kind} jobs accept any language code"))
    })?;
    Ok(Json(DataResponse { data: languages }))
}
