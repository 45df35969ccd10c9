//! The capability that turns a job's input into its result.

use async_trait::async_trait;
use hailango_core::error::CoreError;
use hailango_core::job::Job;
use hailango_core::media::JobResult;

use crate::processor::ProgressReporter;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The media provider rejected or failed the job.
    #[error("{0}")]
    Failed(String),

    /// Progress could not be recorded.
    #[error(transparent)]
    Store(#[from] CoreError),
}

/// Performs the media work of a job.
///
/// Implementations report intermediate progress through `progress` and
/// return the kind-specific result. Returning an error (or panicking) marks
/// the job failed; the processor owns every status transition.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn process(
        &self,
        job: &Job,
        progress: &mut ProgressReporter,
    ) -> Result<JobResult, BackendError>;
}
