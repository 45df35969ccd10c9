//! Job storage.
//!
//! [`JobStore`] is the seam between the engine and wherever jobs live.
//! [`InMemoryJobStore`] keeps everything in process; a database-backed store
//! implements the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hailango_core::error::CoreError;
use hailango_core::job::{Job, JobId, JobTransition, NewJob};
use hailango_core::types::{BookId, UserId};
use tokio::sync::RwLock;

use crate::record::JobRecord;

/// Create, read and update jobs.
///
/// Every method enforces the lifecycle rules: status only moves
/// `pending -> processing -> {completed, failed}`, progress never decreases,
/// and terminal jobs are immutable.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job. It is visible to reads before this returns.
    async fn create_job(&self, job: NewJob) -> Result<JobId, CoreError>;

    async fn get_job(&self, id: JobId) -> Result<Job, CoreError>;

    /// All jobs of a book, in creation order.
    async fn get_jobs_by_book(&self, book_id: BookId) -> Result<Vec<Job>, CoreError>;

    /// All jobs owned by a user, in creation order.
    async fn get_jobs_by_user(&self, user_id: UserId) -> Result<Vec<Job>, CoreError>;

    async fn update_progress(&self, id: JobId, progress: u8) -> Result<Job, CoreError>;

    async fn transition(&self, id: JobId, transition: JobTransition) -> Result<Job, CoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct JobIndex {
    jobs: HashMap<JobId, Arc<JobRecord>>,
    by_book: HashMap<BookId, Vec<JobId>>,
    by_user: HashMap<UserId, Vec<JobId>>,
}

/// Process-local job table. Never reports `StoreUnavailable`.
#[derive(Default)]
pub struct InMemoryJobStore {
    index: RwLock<JobIndex>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, id: JobId) -> Result<Arc<JobRecord>, CoreError> {
        self.index
            .read()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Snapshot the records chosen by `pick`. The index lock is released
    /// before any record lock is taken.
    async fn snapshots(&self, pick: impl FnOnce(&JobIndex) -> Vec<Arc<JobRecord>>) -> Vec<Job> {
        let records = pick(&*self.index.read().await);
        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            jobs.push(record.snapshot().await);
        }
        jobs
    }
}

fn resolve(index: &JobIndex, ids: Option<&Vec<JobId>>) -> Vec<Arc<JobRecord>> {
    ids.map(|ids| {
        ids.iter()
            .filter_map(|id| index.jobs.get(id).cloned())
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, job: NewJob) -> Result<JobId, CoreError> {
        let id = JobId::new();
        let record = Arc::new(JobRecord::new(id, job));

        let mut index = self.index.write().await;
        index
            .by_book
            .entry(record.book_id())
            .or_default()
            .push(id);
        index
            .by_user
            .entry(record.owner_id())
            .or_default()
            .push(id);
        index.jobs.insert(record.id(), record);
        Ok(id)
    }

    async fn get_job(&self, id: JobId) -> Result<Job, CoreError> {
        Ok(self.record(id).await?.snapshot().await)
    }

    async fn get_jobs_by_book(&self, book_id: BookId) -> Result<Vec<Job>, CoreError> {
        Ok(self
            .snapshots(|index| resolve(index, index.by_book.get(&book_id)))
            .await)
    }

    async fn get_jobs_by_user(&self, user_id: UserId) -> Result<Vec<Job>, CoreError> {
        Ok(self
            .snapshots(|index| resolve(index, index.by_user.get(&user_id)))
            .await)
    }

    async fn update_progress(&self, id: JobId, progress: u8) -> Result<Job, CoreError> {
        self.record(id).await?.update_progress(progress).await
    }

    async fn transition(&self, id: JobId, transition: JobTransition) -> Result<Job, CoreError> {
        self.record(id).await?.apply(transition).await
    }
}
