//! A single job's storage cell.
//!
//! Immutable fields live directly on [`JobRecord`]; everything the processor
//! changes sits behind the record's own lock, so readers always see a
//! consistent snapshot and the table lock is never held across an update.

use chrono::Utc;
use hailango_core::error::CoreError;
use hailango_core::job::{Job, JobId, JobKind, JobStatus, JobTransition, NewJob, MAX_PROGRESS};
use hailango_core::media::{JobInput, JobResult};
use hailango_core::types::{BookId, Timestamp, UserId};
use tokio::sync::RwLock;

struct JobState {
    status: JobStatus,
    progress: u8,
    result: Option<JobResult>,
    error: Option<String>,
    updated_at: Timestamp,
    completed_at: Option<Timestamp>,
}

pub(crate) struct JobRecord {
    id: JobId,
    kind: JobKind,
    owner_id: UserId,
    book_id: BookId,
    page_number: u32,
    input: JobInput,
    created_at: Timestamp,
    state: RwLock<JobState>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, new: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: new.input.kind(),
            owner_id: new.owner_id,
            book_id: new.book_id,
            page_number: new.page_number,
            input: new.input,
            created_at: now,
            state: RwLock::new(JobState {
                status: JobStatus::Pending,
                progress: 0,
                result: None,
                error: None,
                updated_at: now,
                completed_at: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub(crate) fn book_id(&self) -> BookId {
        self.book_id
    }

    pub(crate) async fn snapshot(&self) -> Job {
        let state = self.state.read().await;
        self.to_job(&state)
    }

    /// Raise the progress of a processing job.
    ///
    /// Equal values are accepted; lower values or values above 100 are
    /// `InvalidProgress`. Pending and terminal jobs reject progress with
    /// `InvalidTransition`.
    pub(crate) async fn update_progress(&self, progress: u8) -> Result<Job, CoreError> {
        let mut state = self.state.write().await;
        if state.status != JobStatus::Processing {
            return Err(CoreError::InvalidTransition {
                job_id: self.id,
                from: state.status,
                to: JobStatus::Processing,
            });
        }
        if progress > MAX_PROGRESS || progress < state.progress {
            return Err(CoreError::InvalidProgress {
                job_id: self.id,
                current: state.progress,
                requested: progress,
            });
        }

        state.progress = progress;
        state.updated_at = Utc::now();
        Ok(self.to_job(&state))
    }

    /// Apply a lifecycle transition. On error the record is unchanged.
    pub(crate) async fn apply(&self, transition: JobTransition) -> Result<Job, CoreError> {
        let mut state = self.state.write().await;
        let target = transition.target_status();
        if !state.status.can_transition_to(target) {
            return Err(CoreError::InvalidTransition {
                job_id: self.id,
                from: state.status,
                to: target,
            });
        }

        let now = Utc::now();
        match transition {
            JobTransition::Start => {}
            JobTransition::Complete(result) => {
                state.progress = MAX_PROGRESS;
                state.result = Some(result);
                state.completed_at = Some(now);
            }
            JobTransition::Fail(error) => {
                state.error = Some(error);
                state.completed_at = Some(now);
            }
        }
        state.status = target;
        state.updated_at = now;
        Ok(self.to_job(&state))
    }

    fn to_job(&self, state: &JobState) -> Job {
        Job {
            id: self.id,
            kind: self.kind,
            owner_id: self.owner_id,
            book_id: self.book_id,
            page_number: self.page_number,
            input: self.input.clone(),
            status: state.status,
            progress: state.progress,
            result: state.result.clone(),
            error: state.error.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
            completed_at: state.completed_at,
        }
    }
}
