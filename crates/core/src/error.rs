use crate::job::{JobId, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job {job_id}: invalid transition from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id}: invalid progress {requested} (current {current})")]
    InvalidProgress {
        job_id: JobId,
        current: u8,
        requested: u8,
    },

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing job.
    pub fn job_not_found(id: JobId) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }
}
