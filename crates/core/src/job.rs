//! Job identity, lifecycle state machine, and statistics.
//!
//! A job moves `pending -> processing -> {completed, failed}` and nothing
//! else. The table lives here so every store implementation enforces the same
//! rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::media::{JobInput, JobResult};
use crate::types::{BookId, Timestamp, UserId};

/// Upper bound of the progress percentage.
pub const MAX_PROGRESS: u8 = 100;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique job identifier. Time-ordered (UUID v7) so ids sort by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Kind and status
// ---------------------------------------------------------------------------

/// The media operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Ocr,
    Tts,
    Stt,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Tts => "tts",
            Self::Stt => "stt",
        }
    }

    /// Human-readable label for notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ocr => "OCR",
            Self::Tts => "Speech synthesis",
            Self::Stt => "Speech recognition",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job snapshot
// ---------------------------------------------------------------------------

/// A consistent, point-in-time copy of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub owner_id: UserId,
    pub book_id: BookId,
    pub page_number: u32,
    pub input: JobInput,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

/// Request to create a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub owner_id: UserId,
    pub book_id: BookId,
    pub page_number: u32,
    pub input: JobInput,
}

impl NewJob {
    pub fn kind(&self) -> JobKind {
        self.input.kind()
    }

    /// Validate the request.
    ///
    /// Page numbers are 1-based; the input must pass its own kind-specific
    /// checks.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.page_number == 0 {
            return Err(CoreError::Validation(
                "Page number must be at least 1".to_string(),
            ));
        }
        self.input.validate()
    }
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Start,
    Complete(JobResult),
    Fail(String),
}

impl JobTransition {
    pub fn target_status(&self) -> JobStatus {
        match self {
            Self::Start => JobStatus::Processing,
            Self::Complete(_) => JobStatus::Completed,
            Self::Fail(_) => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = Self::default();
        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
