//! Drives one job through its lifecycle.
//!
//! A processor runs as its own task: it starts the job, hands it to the
//! [`MediaBackend`], and records exactly one terminal transition. Backend
//! errors and panics both end in `failed`; nothing escapes the task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use hailango_core::error::CoreError;
use hailango_core::job::{Job, JobId, JobTransition};

use crate::backend::{BackendError, MediaBackend};
use crate::notifier::{BatchProgress, ProgressNotifier};
use crate::store::JobStore;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Handed to the backend so it can report intermediate progress.
///
/// Each report is stored first and then published to the job owner.
pub struct ProgressReporter {
    job_id: JobId,
    store: Arc<dyn JobStore>,
    notifier: ProgressNotifier,
    batch: Option<Arc<BatchProgress>>,
}

impl ProgressReporter {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Record `percent` and publish it.
    pub async fn report(&mut self, percent: u8) -> Result<(), CoreError> {
        let job = self.store.update_progress(self.job_id, percent).await?;
        tracing::debug!(job_id = %self.job_id, progress = job.progress, "Job progress");
        self.notifier.job_progress(&job, self.batch.as_deref()).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Runs jobs against a backend. Cheap to clone; one clone per job task.
#[derive(Clone)]
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn MediaBackend>,
    notifier: ProgressNotifier,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn MediaBackend>,
        notifier: ProgressNotifier,
    ) -> Self {
        Self {
            store,
            backend,
            notifier,
        }
    }

    /// Process `job_id` to completion.
    ///
    /// Must be the only processor for this job. Returns the final snapshot,
    /// or `None` if the job could not be started or finished (already
    /// logged).
    pub async fn run(self, job_id: JobId, batch: Option<Arc<BatchProgress>>) -> Option<Job> {
        let job = match self.store.transition(job_id, JobTransition::Start).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to start job");
                self.abandon(batch.as_deref()).await;
                return None;
            }
        };
        tracing::info!(
            job_id = %job_id,
            kind = %job.kind,
            book_id = %job.book_id,
            page = job.page_number,
            "Job started",
        );
        self.notifier.job_progress(&job, batch.as_deref()).await;

        let mut reporter = ProgressReporter {
            job_id,
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
            batch: batch.clone(),
        };
        let outcome = AssertUnwindSafe(self.backend.process(&job, &mut reporter))
            .catch_unwind()
            .await;

        let transition = match outcome {
            Ok(Ok(result)) => JobTransition::Complete(result),
            Ok(Err(BackendError::Failed(message))) => JobTransition::Fail(message),
            Ok(Err(BackendError::Store(e))) => {
                JobTransition::Fail(format!("progress update rejected: {e}"))
            }
            Err(panic) => JobTransition::Fail(format!(
                "backend panicked: {}",
                panic_message(panic.as_ref())
            )),
        };
        let succeeded = matches!(transition, JobTransition::Complete(_));

        let finished = match self.store.transition(job_id, transition).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to finish job");
                self.abandon(batch.as_deref()).await;
                return None;
            }
        };
        match &finished.error {
            None => tracing::info!(job_id = %job_id, "Job completed"),
            Some(error) => tracing::warn!(job_id = %job_id, error = %error, "Job failed"),
        }

        let tick = batch.as_deref().map(|batch| batch.finish(succeeded));
        self.notifier.job_progress(&finished, batch.as_deref()).await;

        if let (Some(batch), Some(tick)) = (batch.as_deref(), tick) {
            if tick.is_last {
                self.finish_batch(batch).await;
            }
        }

        Some(finished)
    }

    /// Count a job that never reached a terminal state as failed in its
    /// batch, closing the batch if it was the last one.
    async fn abandon(&self, batch: Option<&BatchProgress>) {
        if let Some(batch) = batch {
            if batch.finish(false).is_last {
                self.finish_batch(batch).await;
            }
        }
    }

    async fn finish_batch(&self, batch: &BatchProgress) {
        tracing::info!(
            book_id = %batch.book_id(),
            total = batch.total(),
            failed = batch.failed(),
            "Batch finished",
        );
        self.notifier.batch_summary(batch).await;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
