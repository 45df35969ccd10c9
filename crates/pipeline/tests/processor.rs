//! Integration tests for `JobService` and `JobProcessor`.
//!
//! Jobs run against the simulated backend on a paused clock, so the
//! per-step delays cost no wall time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use hailango_core::error::CoreError;
use hailango_core::job::{Job, JobId, JobKind, JobStatus, JobTransition, NewJob};
use hailango_core::media::{JobInput, JobResult, TtsOptions};
use hailango_events::{Hub, Message, MessageType};
use hailango_pipeline::{
    BackendError, InMemoryJobStore, JobService, JobStore, MediaBackend, ProgressReporter,
    SimulatedBackend, SimulationConfig,
};
use uuid::Uuid;

fn service_with(backend: Arc<dyn MediaBackend>) -> (JobService, Arc<Hub>) {
    let hub = Arc::new(Hub::default());
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    (JobService::new(store, backend, Arc::clone(&hub)), hub)
}

fn simulated(failure_rate: f64) -> Arc<dyn MediaBackend> {
    Arc::new(SimulatedBackend::new(
        SimulationConfig::default().with_failure_rate(failure_rate),
    ))
}

fn ocr_input() -> JobInput {
    JobInput::Ocr {
        language: "ru".to_string(),
        image_url: None,
    }
}

fn tts_input(text: &str) -> JobInput {
    JobInput::Tts {
        text: text.to_string(),
        language: "ru".to_string(),
        options: TtsOptions::default(),
    }
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<Arc<Message>>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(serde_json::to_value(&*msg).unwrap());
    }
    out
}

// ---------------------------------------------------------------------------
// Test: a single OCR job runs to completion (Scenario A)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn ocr_job_completes() {
    let (jobs, _hub) = service_with(simulated(0.0));
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();

    let id = jobs
        .create_job(NewJob {
            owner_id: owner,
            book_id: book,
            page_number: 5,
            input: ocr_input(),
        })
        .await
        .unwrap();

    let pending = jobs.get_job(id).await.unwrap();
    assert_eq!(pending.status, JobStatus::Pending);
    assert_eq!(pending.progress, 0);
    assert_matches!(
        &pending.input,
        JobInput::Ocr { image_url: Some(url), .. }
            if url == &format!("/storage/books/{book}/pages/5.jpg")
    );

    jobs.wait_idle().await;

    let done = jobs.get_job(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_matches!(done.result, Some(JobResult::Ocr(ocr)) if ocr.detected_language == "ru");
    assert!(done.error.is_none());
}

#[tokio::test]
async fn invalid_job_is_rejected_before_storing() {
    let (jobs, _hub) = service_with(simulated(0.0));
    let owner = Uuid::new_v4();

    let result = jobs
        .create_job(NewJob {
            owner_id: owner,
            book_id: Uuid::new_v4(),
            page_number: 1,
            input: tts_input(""),
        })
        .await;

    assert_matches!(result, Err(CoreError::Validation(_)));
    assert!(jobs.get_jobs_by_user(owner).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: the owner's connection sees ordered progress
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn owner_receives_progress_in_order() {
    let (jobs, hub) = service_with(simulated(0.0));
    let owner = Uuid::new_v4();
    let mut conn = hub.register(owner).await.unwrap();

    let id = jobs
        .create_job(NewJob {
            owner_id: owner,
            book_id: Uuid::new_v4(),
            page_number: 1,
            input: tts_input("Привет"),
        })
        .await
        .unwrap();
    jobs.wait_idle().await;

    let messages = drain(&mut conn.outbound);
    assert!(messages.iter().all(|m| m["type"] == "tts_progress"));
    assert!(messages.iter().all(|m| m["data"]["jobId"] == id.to_string()));

    let percents: Vec<u64> = messages
        .iter()
        .map(|m| m["data"]["progressPercent"].as_u64().unwrap())
        .collect();
    assert_eq!(percents, vec![0, 10, 20, 40, 60, 80, 100]);

    let last = messages.last().unwrap();
    assert_eq!(last["data"]["status"], "completed");
    assert_eq!(last["data"]["totalUnits"], 1);
    assert_eq!(last["data"]["processedUnits"], 1);
}

// ---------------------------------------------------------------------------
// Test: failures are captured as the failed state
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn simulated_failure_stops_at_forty_percent() {
    let (jobs, hub) = service_with(simulated(1.0));
    let owner = Uuid::new_v4();
    let mut conn = hub.register(owner).await.unwrap();

    let id = jobs
        .create_job(NewJob {
            owner_id: owner,
            book_id: Uuid::new_v4(),
            page_number: 3,
            input: ocr_input(),
        })
        .await
        .unwrap();
    jobs.wait_idle().await;

    let job = jobs.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 40);
    assert!(job.error.unwrap().contains("simulated ocr failure"));

    let last = drain(&mut conn.outbound).pop().unwrap();
    assert_eq!(last["data"]["status"], "failed");
    assert!(last["data"]["message"].is_string());
}

struct PanickingBackend;

#[async_trait]
impl MediaBackend for PanickingBackend {
    async fn process(
        &self,
        _job: &Job,
        progress: &mut ProgressReporter,
    ) -> Result<JobResult, BackendError> {
        progress.report(30).await?;
        panic!("decoder exploded");
    }
}

#[tokio::test]
async fn backend_panic_fails_the_job() {
    let (jobs, _hub) = service_with(Arc::new(PanickingBackend));

    let id = jobs
        .create_job(NewJob {
            owner_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            page_number: 1,
            input: ocr_input(),
        })
        .await
        .unwrap();
    jobs.wait_idle().await;

    let job = jobs.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 30);
    assert_eq!(
        job.error.as_deref(),
        Some("backend panicked: decoder exploded")
    );
}

struct RegressingBackend;

#[async_trait]
impl MediaBackend for RegressingBackend {
    async fn process(
        &self,
        _job: &Job,
        progress: &mut ProgressReporter,
    ) -> Result<JobResult, BackendError> {
        progress.report(50).await?;
        progress.report(20).await?;
        Err(BackendError::Failed("unreachable".into()))
    }
}

#[tokio::test]
async fn rejected_progress_fails_the_job() {
    let (jobs, _hub) = service_with(Arc::new(RegressingBackend));

    let id = jobs
        .create_job(NewJob {
            owner_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            page_number: 1,
            input: ocr_input(),
        })
        .await
        .unwrap();
    jobs.wait_idle().await;

    let job = jobs.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 50);
    assert!(job.error.unwrap().starts_with("progress update rejected"));
}

// ---------------------------------------------------------------------------
// Test: a 150-page batch (Scenario C)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn batch_of_150_pages_all_finish() {
    let (jobs, _hub) = service_with(simulated(0.3));
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();

    let ids = jobs
        .batch_create(owner, book, JobKind::Ocr, vec![ocr_input(); 150])
        .await
        .unwrap();
    assert_eq!(ids.len(), 150);

    let listed = jobs.get_jobs_by_book(book).await.unwrap();
    assert_eq!(listed.len(), 150);
    let mut pages: Vec<u32> = listed.iter().map(|j| j.page_number).collect();
    pages.sort_unstable();
    assert_eq!(pages, (1..=150).collect::<Vec<_>>());

    jobs.wait_idle().await;

    let stats = jobs.statistics_for_book(owner, book).await.unwrap();
    assert_eq!(stats.total, 150);
    assert_eq!(stats.completed + stats.failed, 150);
    assert_eq!(stats.pending + stats.processing, 0);
    assert_eq!(jobs.statistics_for_user(owner).await.unwrap(), stats);
    assert_eq!(jobs.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn batch_ends_with_summary_notification() {
    let (jobs, hub) = service_with(simulated(0.0));
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();
    let mut conn = hub.register(owner).await.unwrap();

    jobs.batch_create(owner, book, JobKind::Tts, vec![tts_input("Да"); 3])
        .await
        .unwrap();
    jobs.wait_idle().await;

    let messages = drain(&mut conn.outbound);
    let summary = messages
        .iter()
        .find(|m| m["type"] == MessageType::Notification.as_str())
        .unwrap();
    assert_eq!(summary["data"]["level"], "success");
    assert_eq!(summary["data"]["action"]["url"], format!("/books/{book}"));

    let progress: Vec<_> = messages
        .iter()
        .filter(|m| m["type"] == "tts_progress")
        .collect();
    assert!(progress.iter().all(|m| m["data"]["totalUnits"] == 3));
    let finished = progress
        .iter()
        .filter(|m| m["data"]["status"] == "completed")
        .count();
    assert_eq!(finished, 3);
    assert_eq!(
        messages
            .iter()
            .filter(|m| m["type"] == "notification")
            .count(),
        1
    );
}

#[tokio::test]
async fn batch_rejects_mixed_or_empty_input() {
    let (jobs, _hub) = service_with(simulated(0.0));
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();

    assert_matches!(
        jobs.batch_create(owner, book, JobKind::Ocr, Vec::new()).await,
        Err(CoreError::Validation(_))
    );
    assert_matches!(
        jobs.batch_create(owner, book, JobKind::Ocr, vec![ocr_input(), tts_input("x")])
            .await,
        Err(CoreError::Validation(_))
    );
    assert_matches!(
        jobs.batch_create(owner, book, JobKind::Tts, vec![tts_input("ok"), tts_input("")])
            .await,
        Err(CoreError::Validation(_))
    );
    assert!(jobs.get_jobs_by_book(book).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: store failures during a batch
// ---------------------------------------------------------------------------

/// Wraps the in-memory store and fails selected calls.
struct FailingStore {
    inner: InMemoryJobStore,
    /// 1-based create call that starts failing.
    fail_create_from: usize,
    fail_start: bool,
    creates: AtomicUsize,
}

impl FailingStore {
    fn failing_create(from: usize) -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            fail_create_from: from,
            fail_start: false,
            creates: AtomicUsize::new(0),
        }
    }

    fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::failing_create(usize::MAX)
        }
    }
}

#[async_trait]
impl JobStore for FailingStore {
    async fn create_job(&self, job: NewJob) -> Result<JobId, CoreError> {
        if self.creates.fetch_add(1, Ordering::SeqCst) + 1 >= self.fail_create_from {
            return Err(CoreError::StoreUnavailable("disk full".into()));
        }
        self.inner.create_job(job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Job, CoreError> {
        self.inner.get_job(id).await
    }

    async fn get_jobs_by_book(&self, book_id: Uuid) -> Result<Vec<Job>, CoreError> {
        self.inner.get_jobs_by_book(book_id).await
    }

    async fn get_jobs_by_user(&self, user_id: Uuid) -> Result<Vec<Job>, CoreError> {
        self.inner.get_jobs_by_user(user_id).await
    }

    async fn update_progress(&self, id: JobId, progress: u8) -> Result<Job, CoreError> {
        self.inner.update_progress(id, progress).await
    }

    async fn transition(&self, id: JobId, transition: JobTransition) -> Result<Job, CoreError> {
        if self.fail_start && matches!(transition, JobTransition::Start) {
            return Err(CoreError::StoreUnavailable("connection reset".into()));
        }
        self.inner.transition(id, transition).await
    }
}

fn service_on(store: FailingStore) -> (JobService, Arc<Hub>) {
    let hub = Arc::new(Hub::default());
    let store: Arc<dyn JobStore> = Arc::new(store);
    (
        JobService::new(store, simulated(0.0), Arc::clone(&hub)),
        hub,
    )
}

#[tokio::test(start_paused = true)]
async fn partially_stored_batch_still_runs_to_completion() {
    let (jobs, hub) = service_on(FailingStore::failing_create(3));
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();
    let mut conn = hub.register(owner).await.unwrap();

    let result = jobs
        .batch_create(owner, book, JobKind::Ocr, vec![ocr_input(); 5])
        .await;
    assert_matches!(result, Err(CoreError::StoreUnavailable(_)));

    jobs.wait_idle().await;

    let stored = jobs.get_jobs_by_book(book).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|job| job.status == JobStatus::Completed));
    assert_eq!(jobs.in_flight(), 0);

    let messages = drain(&mut conn.outbound);
    assert!(messages
        .iter()
        .filter(|m| m["type"] == "ocr_progress")
        .all(|m| m["data"]["totalUnits"] == 2));
    let summaries: Vec<_> = messages
        .iter()
        .filter(|m| m["type"] == "notification")
        .collect();
    assert_eq!(summaries.len(), 1);
    assert_eq!(
        summaries[0]["data"]["message"],
        "2 of 2 pages processed successfully, 0 failed"
    );
}

#[tokio::test(start_paused = true)]
async fn batch_summary_is_sent_when_jobs_cannot_start() {
    let (jobs, hub) = service_on(FailingStore::failing_start());
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();
    let mut conn = hub.register(owner).await.unwrap();

    jobs.batch_create(owner, book, JobKind::Tts, vec![tts_input("Да"); 2])
        .await
        .unwrap();
    jobs.wait_idle().await;

    let messages = drain(&mut conn.outbound);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "notification");
    assert_eq!(messages[0]["data"]["level"], "warning");
    assert_eq!(
        messages[0]["data"]["message"],
        "0 of 2 pages processed successfully, 2 failed"
    );
}

// ---------------------------------------------------------------------------
// Test: shutdown waits for in-flight processors
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_processors() {
    let (jobs, _hub) = service_with(simulated(0.0));
    let owner = Uuid::new_v4();
    let book = Uuid::new_v4();
    jobs.batch_create(owner, book, JobKind::Stt, {
        vec![
            JobInput::Stt {
                audio_url: "/rec/1.wav".to_string(),
                language: "ru".to_string(),
                reference_text: Some("Привет".to_string()),
            };
            4
        ]
    })
    .await
    .unwrap();

    assert!(!jobs.shutdown(Duration::from_millis(10)).await);
    assert!(jobs.shutdown(Duration::from_secs(5)).await);

    let stats = jobs.statistics_for_book(owner, book).await.unwrap();
    assert_eq!(stats.completed, 4);
    assert_eq!(
        jobs.statistics_for_book(Uuid::new_v4(), book).await.unwrap().total,
        0
    );
}
