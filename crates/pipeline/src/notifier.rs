//! Publishing job progress to the notification hub.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hailango_core::job::{Job, JobKind, JobStatus};
use hailango_core::types::{BookId, UserId};
use hailango_events::{
    Hub, Message, NotificationAction, NotificationLevel, NotificationPayload, ProgressPayload,
    ProgressStatus,
};

/// Upper bound for one hub publish. The hub never blocks on a client, so
/// this only trips if the registry lock is heavily contended.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Batch progress
// ---------------------------------------------------------------------------

/// Shared counter for the jobs of one batch.
#[derive(Debug)]
pub struct BatchProgress {
    owner_id: UserId,
    book_id: BookId,
    kind: JobKind,
    total: u32,
    finished: AtomicU32,
    failed: AtomicU32,
}

/// Result of recording one finished batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTick {
    pub processed: u32,
    pub is_last: bool,
}

impl BatchProgress {
    pub fn new(owner_id: UserId, book_id: BookId, kind: JobKind, total: u32) -> Self {
        Self {
            owner_id,
            book_id,
            kind,
            total,
            finished: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn processed(&self) -> u32 {
        self.finished.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u32 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u32 {
        self.processed().saturating_sub(self.failed())
    }

    /// Record one finished job. Exactly one caller observes `is_last`.
    pub fn finish(&self, succeeded: bool) -> BatchTick {
        if !succeeded {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
        let processed = self.finished.fetch_add(1, Ordering::AcqRel) + 1;
        BatchTick {
            processed,
            is_last: processed == self.total,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Sends job progress and batch summaries to the owning user's connections.
#[derive(Clone)]
pub struct ProgressNotifier {
    hub: Arc<Hub>,
    publish_timeout: Duration,
}

impl ProgressNotifier {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Publish a message to every connection of `user_id`.
    ///
    /// Returns the number of connections reached; zero on timeout.
    pub async fn publish(&self, user_id: UserId, message: Message) -> usize {
        self.bounded(user_id, self.hub.send_to_user(user_id, message))
            .await
    }

    async fn bounded(&self, user_id: UserId, send: impl Future<Output = usize>) -> usize {
        match tokio::time::timeout(self.publish_timeout, send).await {
            Ok(delivered) => delivered,
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    timeout_ms = self.publish_timeout.as_millis() as u64,
                    "Progress publish timed out",
                );
                0
            }
        }
    }

    /// Publish the current state of `job`.
    pub async fn job_progress(&self, job: &Job, batch: Option<&BatchProgress>) -> usize {
        let status = match job.status {
            JobStatus::Completed => ProgressStatus::Completed,
            JobStatus::Failed => ProgressStatus::Failed,
            JobStatus::Pending | JobStatus::Processing => ProgressStatus::Processing,
        };
        let (total_units, processed_units) = match batch {
            Some(batch) => (batch.total(), batch.processed()),
            None => (1, u32::from(job.status.is_terminal())),
        };

        let payload = ProgressPayload {
            job_id: job.id,
            book_id: job.book_id,
            total_units,
            processed_units,
            current_unit: job.page_number,
            progress_percent: job.progress,
            status,
            message: job.error.clone(),
        };
        self.publish(job.owner_id, Message::progress(job.kind, payload))
            .await
    }

    /// Tell the batch owner that every job of the batch has finished.
    pub async fn batch_summary(&self, batch: &BatchProgress) -> usize {
        let completed = batch.completed();
        let failed = batch.failed();
        let level = if failed == 0 {
            NotificationLevel::Success
        } else {
            NotificationLevel::Warning
        };

        let payload = NotificationPayload {
            title: format!("{} finished", batch.kind.label()),
            message: format!(
                "{completed} of {} pages processed successfully, {failed} failed",
                batch.total
            ),
            level,
            action: Some(NotificationAction {
                label: "Open book".to_string(),
                url: format!("/books/{}", batch.book_id),
            }),
        };
        self.publish(batch.owner_id, Message::notification(payload))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
