//! WebSocket message type names pushed to clients.
//!
//! These must match the `type` values the web and mobile clients switch on.

/// OCR job progress (percentage + unit counters).
pub const MSG_TYPE_OCR_PROGRESS: &str = "ocr_progress";

/// Speech synthesis job progress.
pub const MSG_TYPE_TTS_PROGRESS: &str = "tts_progress";

/// Speech recognition job progress.
pub const MSG_TYPE_STT_PROGRESS: &str = "stt_progress";

/// User-facing notification with a title, message and level.
pub const MSG_TYPE_NOTIFICATION: &str = "notification";

/// Sent once right after a connection is registered.
pub const MSG_TYPE_CONNECTION_ESTABLISHED: &str = "connection_established";

/// Error reported to the client (malformed frame, rejected request).
pub const MSG_TYPE_ERROR: &str = "error";

/// Application-level keepalive sent by clients.
pub const MSG_TYPE_PING: &str = "ping";

/// Reply to an application-level ping.
pub const MSG_TYPE_PONG: &str = "pong";
