//! Engine API used by the HTTP layer.
//!
//! [`JobService`] is the only place that spawns processors, which is what
//! guarantees one processor per job.

use std::sync::Arc;
use std::time::Duration;

use hailango_core::error::CoreError;
use hailango_core::job::{Job, JobId, JobKind, JobStats, NewJob};
use hailango_core::media::{self, JobInput, LanguageInfo};
use hailango_core::types::{BookId, UserId};
use hailango_events::Hub;
use tokio_util::task::TaskTracker;

use crate::backend::MediaBackend;
use crate::notifier::{BatchProgress, ProgressNotifier};
use crate::processor::JobProcessor;
use crate::store::JobStore;

/// Largest number of pages accepted in one batch.
pub const MAX_BATCH_SIZE: usize = 1000;

pub struct JobService {
    store: Arc<dyn JobStore>,
    processor: JobProcessor,
    tasks: TaskTracker,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, backend: Arc<dyn MediaBackend>, hub: Arc<Hub>) -> Self {
        Self::with_notifier(store, backend, ProgressNotifier::new(hub))
    }

    pub fn with_notifier(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn MediaBackend>,
        notifier: ProgressNotifier,
    ) -> Self {
        Self {
            processor: JobProcessor::new(Arc::clone(&store), backend, notifier),
            store,
            tasks: TaskTracker::new(),
        }
    }

    // -- commands ----------------------------------------------------------

    /// Validate and store a job, then start its processor.
    ///
    /// Returns as soon as the job is stored; the job is `pending` at that
    /// point and processing continues in the background.
    pub async fn create_job(&self, job: NewJob) -> Result<JobId, CoreError> {
        job.validate()?;
        let job = with_page_defaults(job);
        let owner_id = job.owner_id;
        let kind = job.kind();

        let id = self.store.create_job(job).await?;
        tracing::info!(job_id = %id, user_id = %owner_id, kind = %kind, "Job created");

        self.spawn(id, None);
        Ok(id)
    }

    /// Create one job per input, for pages `1..=inputs.len()`.
    ///
    /// Every input is validated before any job is stored, so a bad input
    /// rejects the whole batch. Each job gets its own processor and fails
    /// independently.
    ///
    /// If the store fails partway through, the error is returned but the
    /// jobs already stored are still processed as a smaller batch.
    pub async fn batch_create(
        &self,
        owner_id: UserId,
        book_id: BookId,
        kind: JobKind,
        inputs: Vec<JobInput>,
    ) -> Result<Vec<JobId>, CoreError> {
        if inputs.is_empty() {
            return Err(CoreError::Validation(
                "Batch must contain at least one page".to_string(),
            ));
        }
        if inputs.len() > MAX_BATCH_SIZE {
            return Err(CoreError::Validation(format!(
                "Batch must not exceed {MAX_BATCH_SIZE} pages"
            )));
        }

        let mut jobs = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.into_iter().enumerate() {
            if input.kind() != kind {
                return Err(CoreError::Validation(format!(
                    "Page {} is a {} job in a {kind} batch",
                    i + 1,
                    input.kind()
                )));
            }
            let job = NewJob {
                owner_id,
                book_id,
                page_number: (i + 1) as u32,
                input,
            };
            job.validate()?;
            jobs.push(with_page_defaults(job));
        }

        let requested = jobs.len();
        let mut ids = Vec::with_capacity(requested);
        let mut store_error = None;
        for job in jobs {
            match self.store.create_job(job).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    store_error = Some(e);
                    break;
                }
            }
        }

        // Jobs stored before a failure still get their processors, and the
        // batch counter covers exactly those jobs.
        if !ids.is_empty() {
            let batch = Arc::new(BatchProgress::new(
                owner_id,
                book_id,
                kind,
                ids.len() as u32,
            ));
            for id in &ids {
                self.spawn(*id, Some(Arc::clone(&batch)));
            }
        }

        if let Some(e) = store_error {
            tracing::error!(
                book_id = %book_id,
                user_id = %owner_id,
                kind = %kind,
                stored = ids.len(),
                requested,
                error = %e,
                "Batch creation stopped early",
            );
            return Err(e);
        }

        tracing::info!(
            book_id = %book_id,
            user_id = %owner_id,
            kind = %kind,
            total = ids.len(),
            "Batch created",
        );
        Ok(ids)
    }

    fn spawn(&self, id: JobId, batch: Option<Arc<BatchProgress>>) {
        self.tasks.spawn(self.processor.clone().run(id, batch));
    }

    // -- queries -----------------------------------------------------------

    pub async fn get_job(&self, id: JobId) -> Result<Job, CoreError> {
        self.store.get_job(id).await
    }

    pub async fn get_jobs_by_book(&self, book_id: BookId) -> Result<Vec<Job>, CoreError> {
        self.store.get_jobs_by_book(book_id).await
    }

    pub async fn get_jobs_by_user(&self, user_id: UserId) -> Result<Vec<Job>, CoreError> {
        self.store.get_jobs_by_user(user_id).await
    }

    pub async fn statistics_for_user(&self, user_id: UserId) -> Result<JobStats, CoreError> {
        let jobs = self.store.get_jobs_by_user(user_id).await?;
        Ok(JobStats::from_jobs(&jobs))
    }

    /// Jobs of `book_id` owned by `owner_id`, in creation order.
    pub async fn get_book_jobs_for_user(
        &self,
        owner_id: UserId,
        book_id: BookId,
    ) -> Result<Vec<Job>, CoreError> {
        let mut jobs = self.store.get_jobs_by_book(book_id).await?;
        jobs.retain(|job| job.owner_id == owner_id);
        Ok(jobs)
    }

    pub async fn statistics_for_book(
        &self,
        owner_id: UserId,
        book_id: BookId,
    ) -> Result<JobStats, CoreError> {
        let jobs = self.get_book_jobs_for_user(owner_id, book_id).await?;
        Ok(JobStats::from_jobs(&jobs))
    }

    /// Language catalogue for `kind`, or `None` when the kind accepts any
    /// language code.
    pub fn supported_languages(&self, kind: JobKind) -> Option<&'static [LanguageInfo]> {
        media::supported_languages(kind)
    }

    /// Number of processors still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Wait until every processor spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Wait up to `timeout` for in-flight processors. Processors are never
    /// cancelled; returns `false` if some were still running.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight jobs");
        }
        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    "Timed out waiting for in-flight jobs",
                );
                false
            }
        }
    }
}

fn with_page_defaults(job: NewJob) -> NewJob {
    NewJob {
        input: job.input.with_page_defaults(job.book_id, job.page_number),
        ..job
    }
}
