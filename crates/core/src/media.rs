//! Kind-specific job inputs and results for OCR, TTS and STT jobs.
//!
//! Inputs are validated once at creation time; results are produced by a
//! media backend and stored on the job when it completes.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobKind;
use crate::types::BookId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Slowest TTS playback speed accepted.
pub const TTS_MIN_SPEED: f32 = 0.5;

/// Fastest TTS playback speed accepted.
pub const TTS_MAX_SPEED: f32 = 2.0;

/// Default TTS playback speed.
pub const TTS_DEFAULT_SPEED: f32 = 1.0;

/// Maximum number of characters synthesized in a single TTS job.
pub const TTS_MAX_TEXT_LEN: usize = 10_000;

/// Maximum length of a language code (e.g. `ru`, `zh-Hant`).
const MAX_LANGUAGE_LEN: usize = 16;

/// Pronunciation score weights, in percent. They sum to 100.
pub const ACCURACY_WEIGHT: u32 = 40;
pub const FLUENCY_WEIGHT: u32 = 30;
pub const PRONUNCIATION_WEIGHT: u32 = 30;

/// Lower bounds for each feedback level; anything below `fair` is `poor`.
pub const SCORE_EXCELLENT_THRESHOLD: u8 = 90;
pub const SCORE_GOOD_THRESHOLD: u8 = 75;
pub const SCORE_FAIR_THRESHOLD: u8 = 45;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Encoding of synthesized audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
        }
    }
}

fn default_speed() -> f32 {
    TTS_DEFAULT_SPEED
}

/// Options for a TTS job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsOptions {
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default)]
    pub format: AudioFormat,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            speed: TTS_DEFAULT_SPEED,
            voice: None,
            format: AudioFormat::default(),
        }
    }
}

/// What a job should process. The `kind` tag decides the job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobInput {
    Ocr {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    Tts {
        text: String,
        language: String,
        #[serde(default)]
        options: TtsOptions,
    },
    Stt {
        audio_url: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference_text: Option<String>,
    },
}

impl JobInput {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Ocr { .. } => JobKind::Ocr,
            Self::Tts { .. } => JobKind::Tts,
            Self::Stt { .. } => JobKind::Stt,
        }
    }

    pub fn language(&self) -> &str {
        match self {
            Self::Ocr { language, .. } | Self::Tts { language, .. } | Self::Stt { language, .. } => {
                language
            }
        }
    }

    /// Fill in values derived from the job's position in a book.
    ///
    /// An OCR job without an explicit image reads the stored page scan.
    pub fn with_page_defaults(self, book_id: BookId, page_number: u32) -> Self {
        match self {
            Self::Ocr {
                language,
                image_url: None,
            } => Self::Ocr {
                language,
                image_url: Some(page_image_url(book_id, page_number)),
            },
            other => other,
        }
    }

    /// Validate the input.
    ///
    /// Rules:
    /// - Language must be non-empty and at most `MAX_LANGUAGE_LEN` characters.
    /// - TTS and STT languages must be in their catalogue.
    /// - TTS text must be non-empty and at most `TTS_MAX_TEXT_LEN` characters.
    /// - TTS speed must be within `TTS_MIN_SPEED..=TTS_MAX_SPEED`.
    /// - STT audio URL must be non-empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_language(self.language())?;
        validate_catalogued_language(self.kind(), self.language())?;
        match self {
            Self::Ocr { image_url, .. } => {
                if image_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                    return Err(CoreError::Validation(
                        "OCR image_url must not be blank".to_string(),
                    ));
                }
            }
            Self::Tts { text, options, .. } => {
                if text.trim().is_empty() {
                    return Err(CoreError::Validation(
                        "TTS text must not be empty".to_string(),
                    ));
                }
                if text.chars().count() > TTS_MAX_TEXT_LEN {
                    return Err(CoreError::Validation(format!(
                        "TTS text must not exceed {TTS_MAX_TEXT_LEN} characters"
                    )));
                }
                if !(TTS_MIN_SPEED..=TTS_MAX_SPEED).contains(&options.speed) {
                    return Err(CoreError::Validation(format!(
                        "TTS speed must be between {TTS_MIN_SPEED} and {TTS_MAX_SPEED}, got {}",
                        options.speed
                    )));
                }
            }
            Self::Stt { audio_url, .. } => {
                if audio_url.trim().is_empty() {
                    return Err(CoreError::Validation(
                        "STT audio_url must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn validate_language(language: &str) -> Result<(), CoreError> {
    if language.trim().is_empty() {
        return Err(CoreError::Validation(
            "Language must not be empty".to_string(),
        ));
    }
    if language.len() > MAX_LANGUAGE_LEN {
        return Err(CoreError::Validation(format!(
            "Language code must not exceed {MAX_LANGUAGE_LEN} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Language catalogue
// ---------------------------------------------------------------------------

/// A language a speech provider can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
    /// Synthesis voices. Empty for speech recognition.
    #[serde(skip_serializing_if = "has_no_voices")]
    pub voices: &'static [&'static str],
    pub is_supported: bool,
    /// Whether recognition can score pronunciation. Only set for STT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_pronunciation: Option<bool>,
}

fn has_no_voices(voices: &&'static [&'static str]) -> bool {
    voices.is_empty()
}

const fn tts_language(
    code: &'static str,
    name: &'static str,
    native_name: &'static str,
    voices: &'static [&'static str],
) -> LanguageInfo {
    LanguageInfo {
        code,
        name,
        native_name,
        voices,
        is_supported: true,
        supports_pronunciation: None,
    }
}

const fn stt_language(
    code: &'static str,
    name: &'static str,
    native_name: &'static str,
) -> LanguageInfo {
    LanguageInfo {
        code,
        name,
        native_name,
        voices: &[],
        is_supported: true,
        supports_pronunciation: Some(true),
    }
}

/// Languages accepted by TTS jobs, with their synthesis voices.
pub const TTS_LANGUAGES: &[LanguageInfo] = &[
    tts_language("ja", "Japanese", "日本語", &["ja-JP-Neural2-B", "ja-JP-Neural2-C"]),
    tts_language("en", "English", "English", &["en-US-Neural2-A", "en-US-Neural2-C"]),
    tts_language("zh", "Chinese", "中文", &["zh-CN-Neural2-A", "zh-CN-Neural2-B"]),
    tts_language("ru", "Russian", "Русский", &["ru-RU-Wavenet-A", "ru-RU-Wavenet-B"]),
    tts_language("fa", "Persian", "فارسی", &["fa-IR-Wavenet-A"]),
    tts_language("he", "Hebrew", "עברית", &["he-IL-Wavenet-A"]),
    tts_language("es", "Spanish", "Español", &["es-ES-Neural2-A", "es-ES-Neural2-B"]),
    tts_language("fr", "French", "Français", &["fr-FR-Neural2-A", "fr-FR-Neural2-B"]),
    tts_language("pt", "Portuguese", "Português", &["pt-BR-Neural2-A", "pt-BR-Neural2-B"]),
    tts_language("de", "German", "Deutsch", &["de-DE-Neural2-A", "de-DE-Neural2-B"]),
    tts_language("it", "Italian", "Italiano", &["it-IT-Neural2-A", "it-IT-Neural2-B"]),
    tts_language("tr", "Turkish", "Türkçe", &["tr-TR-Wavenet-A"]),
];

/// Languages accepted by STT jobs.
pub const STT_LANGUAGES: &[LanguageInfo] = &[
    stt_language("ja", "Japanese", "日本語"),
    stt_language("en", "English", "English"),
    stt_language("zh", "Chinese", "中文"),
    stt_language("ru", "Russian", "Русский"),
    stt_language("fa", "Persian", "فارسی"),
    stt_language("he", "Hebrew", "עברית"),
    stt_language("es", "Spanish", "Español"),
    stt_language("fr", "French", "Français"),
    stt_language("pt", "Portuguese", "Português"),
    stt_language("de", "German", "Deutsch"),
    stt_language("it", "Italian", "Italiano"),
    stt_language("tr", "Turkish", "Türkçe"),
];

/// The language catalogue for `kind`. OCR has none and accepts any code.
pub fn supported_languages(kind: JobKind) -> Option<&'static [LanguageInfo]> {
    match kind {
        JobKind::Ocr => None,
        JobKind::Tts => Some(TTS_LANGUAGES),
        JobKind::Stt => Some(STT_LANGUAGES),
    }
}

/// Look up `code` in the catalogue for `kind`.
pub fn find_language(kind: JobKind, code: &str) -> Option<&'static LanguageInfo> {
    supported_languages(kind)?
        .iter()
        .find(|lang| lang.code == code)
}

fn validate_catalogued_language(kind: JobKind, code: &str) -> Result<(), CoreError> {
    let Some(catalogue) = supported_languages(kind) else {
        return Ok(());
    };
    match find_language(kind, code) {
        Some(lang) if lang.is_supported => Ok(()),
        _ => Err(CoreError::Validation(format!(
            "Unsupported {kind} language: '{code}'. Supported languages: {}",
            catalogue
                .iter()
                .filter(|lang| lang.is_supported)
                .map(|lang| lang.code)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Storage path of a scanned book page.
pub fn page_image_url(book_id: BookId, page_number: u32) -> String {
    format!("/storage/books/{book_id}/pages/{page_number}.jpg")
}

/// Storage path of a synthesized audio file.
pub fn audio_url(audio_id: uuid::Uuid, format: AudioFormat) -> String {
    format!("/storage/audio/{audio_id}.{}", format.extension())
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub detected_language: String,
    pub confidence: f64,
    pub words: Vec<OcrWord>,
    /// Milliseconds spent recognizing the page.
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsResult {
    pub audio_id: uuid::Uuid,
    pub audio_url: String,
    /// Estimated length in seconds.
    pub duration_secs: u32,
    pub format: AudioFormat,
    pub speed: f32,
}

/// Coarse pronunciation feedback bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl FeedbackLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= SCORE_EXCELLENT_THRESHOLD => Self::Excellent,
            s if s >= SCORE_GOOD_THRESHOLD => Self::Good,
            s if s >= SCORE_FAIR_THRESHOLD => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent pronunciation!",
            Self::Good => "Good pronunciation, keep practicing.",
            Self::Fair => "Fair pronunciation, some sounds need work.",
            Self::Poor => "Keep practicing, listen to the reference audio again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationScore {
    pub total_score: u8,
    pub accuracy_score: u8,
    pub fluency_score: u8,
    pub pronunciation_score: u8,
    pub feedback_level: FeedbackLevel,
    pub feedback_message: String,
}

impl PronunciationScore {
    /// Build a score from its components; the total is their weighted mean.
    pub fn from_components(accuracy: u8, fluency: u8, pronunciation: u8) -> Self {
        let total = weighted_total(accuracy, fluency, pronunciation);
        let level = FeedbackLevel::from_score(total);
        Self {
            total_score: total,
            accuracy_score: accuracy,
            fluency_score: fluency,
            pronunciation_score: pronunciation,
            feedback_level: level,
            feedback_message: level.message().to_string(),
        }
    }
}

/// Weighted mean of the three component scores, rounded to nearest.
pub fn weighted_total(accuracy: u8, fluency: u8, pronunciation: u8) -> u8 {
    let sum = accuracy as u32 * ACCURACY_WEIGHT
        + fluency as u32 * FLUENCY_WEIGHT
        + pronunciation as u32 * PRONUNCIATION_WEIGHT;
    ((sum + 50) / 100).min(100) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttResult {
    pub text: String,
    pub language: String,
    pub confidence: f64,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<PronunciationScore>,
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobResult {
    Ocr(OcrResult),
    Tts(TtsResult),
    Stt(SttResult),
}

impl JobResult {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Ocr(_) => JobKind::Ocr,
            Self::Tts(_) => JobKind::Tts,
            Self::Stt(_) => JobKind::Stt,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
