//! In-process stand-in for the OCR, TTS and STT providers.
//!
//! Walks every job through the same progress steps a real provider reports,
//! sleeping between steps, and returns fixed but well-formed results. A
//! configurable share of jobs fails partway through.

use std::time::Duration;

use async_trait::async_trait;
use hailango_core::job::{Job, JobKind};
use hailango_core::media::{
    audio_url, BoundingBox, JobInput, JobResult, OcrResult, OcrWord, PronunciationScore,
    SttResult, TtsResult,
};

use crate::backend::{BackendError, MediaBackend};
use crate::processor::ProgressReporter;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Progress reported right after the job starts.
pub const INITIAL_PROGRESS: u8 = 10;

/// Progress reported after each simulated step.
pub const STEP_PROGRESS: [u8; 4] = [20, 40, 60, 80];

/// Failing jobs stop right after reporting this value.
pub const FAIL_AFTER_PROGRESS: u8 = 40;

pub const DEFAULT_OCR_STEP_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_TTS_STEP_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_STT_STEP_DELAY: Duration = Duration::from_millis(200);

const SAMPLE_TEXT: &str = "Здравствуйте! Как дела?";
const SAMPLE_LANGUAGE: &str = "ru";

/// Rough speaking rate used to estimate synthesized audio length.
const CHARS_PER_SECOND: f32 = 15.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub ocr_step_delay: Duration,
    pub tts_step_delay: Duration,
    pub stt_step_delay: Duration,
    /// Share of jobs that fail, in `0.0..=1.0`.
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ocr_step_delay: DEFAULT_OCR_STEP_DELAY,
            tts_step_delay: DEFAULT_TTS_STEP_DELAY,
            stt_step_delay: DEFAULT_STT_STEP_DELAY,
            failure_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Use the same delay for every kind.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.ocr_step_delay = delay;
        self.tts_step_delay = delay;
        self.stt_step_delay = delay;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn step_delay(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Ocr => self.ocr_step_delay,
            JobKind::Tts => self.tts_step_delay,
            JobKind::Stt => self.stt_step_delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    config: SimulationConfig,
}

impl SimulatedBackend {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    fn should_fail(&self) -> bool {
        self.config.failure_rate > 0.0 && rand::random::<f64>() < self.config.failure_rate
    }
}

#[async_trait]
impl MediaBackend for SimulatedBackend {
    async fn process(
        &self,
        job: &Job,
        progress: &mut ProgressReporter,
    ) -> Result<JobResult, BackendError> {
        let delay = self.config.step_delay(job.kind);
        let fail = self.should_fail();

        progress.report(INITIAL_PROGRESS).await?;
        for step in STEP_PROGRESS {
            tokio::time::sleep(delay).await;
            progress.report(step).await?;
            if fail && step == FAIL_AFTER_PROGRESS {
                return Err(BackendError::Failed(format!(
                    "simulated {} failure on page {}",
                    job.kind, job.page_number
                )));
            }
        }

        Ok(simulated_result(&job.input))
    }
}

fn simulated_result(input: &JobInput) -> JobResult {
    match input {
        JobInput::Ocr { .. } => JobResult::Ocr(OcrResult {
            text: SAMPLE_TEXT.to_string(),
            detected_language: SAMPLE_LANGUAGE.to_string(),
            confidence: 0.95,
            words: vec![
                word("Здравствуйте", 0.98, 10, 150),
                word("Как", 0.97, 170, 50),
                word("дела", 0.96, 230, 70),
            ],
            processing_time_ms: 3500,
        }),
        JobInput::Tts { text, options, .. } => {
            let audio_id = uuid::Uuid::new_v4();
            let seconds = text.chars().count() as f32 / CHARS_PER_SECOND / options.speed;
            JobResult::Tts(TtsResult {
                audio_id,
                audio_url: audio_url(audio_id, options.format),
                duration_secs: (seconds.ceil() as u32).max(1),
                format: options.format,
                speed: options.speed,
            })
        }
        JobInput::Stt {
            language,
            reference_text,
            ..
        } => JobResult::Stt(SttResult {
            text: reference_text
                .clone()
                .unwrap_or_else(|| SAMPLE_TEXT.to_string()),
            language: language.clone(),
            confidence: 0.92,
            duration_secs: 3.5,
            pronunciation: reference_text
                .as_ref()
                .map(|_| PronunciationScore::from_components(87, 82, 86)),
        }),
    }
}

fn word(text: &str, confidence: f64, x: u32, width: u32) -> OcrWord {
    OcrWord {
        text: text.to_string(),
        confidence,
        bounding_box: BoundingBox {
            x,
            y: 10,
            width,
            height: 30,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
