//! Wire envelope pushed to WebSocket clients.
//!
//! Every frame is `{"type": ..., "data": {...}, "timestamp": RFC 3339}`.
//! A [`Message`] is immutable once built and is shared between connections
//! as `Arc<Message>`, so a fan-out to N connections serializes it N times but
//! never clones the payload.

use chrono::Utc;
use hailango_core::job::{JobId, JobKind};
use hailango_core::message_types::*;
use hailango_core::types::{BookId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Discriminator written to the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    OcrProgress,
    TtsProgress,
    SttProgress,
    Notification,
    ConnectionEstablished,
    Error,
    Ping,
    Pong,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OcrProgress => MSG_TYPE_OCR_PROGRESS,
            Self::TtsProgress => MSG_TYPE_TTS_PROGRESS,
            Self::SttProgress => MSG_TYPE_STT_PROGRESS,
            Self::Notification => MSG_TYPE_NOTIFICATION,
            Self::ConnectionEstablished => MSG_TYPE_CONNECTION_ESTABLISHED,
            Self::Error => MSG_TYPE_ERROR,
            Self::Ping => MSG_TYPE_PING,
            Self::Pong => MSG_TYPE_PONG,
        }
    }

    /// The progress message type for a job kind.
    pub fn progress_for(kind: JobKind) -> Self {
        match kind {
            JobKind::Ocr => Self::OcrProgress,
            JobKind::Tts => Self::TtsProgress,
            JobKind::Stt => Self::SttProgress,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Status carried by a progress payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Processing,
    Completed,
    Failed,
}

/// Progress of one job.
///
/// `progress_percent` is the job's own progress. `total_units` and
/// `processed_units` describe the batch the job belongs to (1 and 0 or 1 for
/// a standalone job); `current_unit` is the job's page number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub job_id: JobId,
    pub book_id: BookId,
    pub total_units: u32,
    pub processed_units: u32,
    pub current_unit: u32,
    pub progress_percent: u8,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablishedPayload {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub message: String,
}

/// Payload written to the `data` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageData {
    Progress(ProgressPayload),
    Notification(NotificationPayload),
    ConnectionEstablished(ConnectionEstablishedPayload),
    Error(ErrorPayload),
    Empty {},
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub data: MessageData,
    pub timestamp: Timestamp,
}

impl Message {
    fn new(kind: MessageType, data: MessageData) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Progress of a job, typed by the job's kind.
    pub fn progress(kind: JobKind, payload: ProgressPayload) -> Self {
        Self::new(
            MessageType::progress_for(kind),
            MessageData::Progress(payload),
        )
    }

    pub fn notification(payload: NotificationPayload) -> Self {
        Self::new(MessageType::Notification, MessageData::Notification(payload))
    }

    pub fn connection_established(user_id: UserId, connection_id: ConnectionId) -> Self {
        Self::new(
            MessageType::ConnectionEstablished,
            MessageData::ConnectionEstablished(ConnectionEstablishedPayload {
                user_id,
                connection_id,
                message: "WebSocket connection established".to_string(),
            }),
        )
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            MessageType::Error,
            MessageData::Error(ErrorPayload {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        )
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, MessageData::Empty {})
    }

    /// Serialize to the JSON text sent in a frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// A client-to-server text frame. Only `type` is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is_ping(&self) -> bool {
        self.kind == MSG_TYPE_PING
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
