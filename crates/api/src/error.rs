use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hailango_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `hailango_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::StoreUnavailable(msg) => {
                    tracing::error!(error = %msg, "Job store unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "STORE_UNAVAILABLE",
                        "The job store is temporarily unavailable".to_string(),
                    )
                }
                // Invariant violations surface as internal errors.
                CoreError::InvalidTransition { .. }
                | CoreError::InvalidProgress { .. }
                | CoreError::Internal(_) => {
                    tracing::error!(error = %core, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hailango_core::job::{JobId, JobStatus};

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn core_errors_map_to_http_status() {
        assert_eq!(
            status_of(CoreError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoreError::job_not_found(JobId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoreError::Unauthorized("no".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(CoreError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CoreError::StoreUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(CoreError::InvalidTransition {
                job_id: JobId::new(),
                from: JobStatus::Completed,
                to: JobStatus::Processing,
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn http_errors_map_to_http_status() {
        assert_eq!(
            status_of(AppError::BadRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::InternalError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
