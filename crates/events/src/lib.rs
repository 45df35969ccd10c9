//! HaiLanGo real-time notification hub.
//!
//! This crate provides the building blocks for pushing job progress and
//! notifications to connected clients:
//!
//! - [`Hub`]: process-wide registry of live connections per user with
//!   bounded, non-blocking fan-out delivery.
//! - [`Message`]: the immutable wire envelope shared between connections.
//! - [`ConnectionHandle`]: per-connection identity, activity clock and
//!   close signal used by the socket pumps.
//! - [`start_monitor`]: background sweep evicting unresponsive and
//!   heartbeat-timed-out connections.

pub mod connection;
pub mod hub;
pub mod message;
pub mod monitor;

pub use connection::{
    CloseReason, ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionState, Registration,
};
pub use hub::{Hub, HubConfig, HubError};
pub use message::{
    ClientFrame, ConnectionEstablishedPayload, ErrorPayload, Message, MessageData, MessageType,
    NotificationAction, NotificationLevel, NotificationPayload, ProgressPayload, ProgressStatus,
};
pub use monitor::start_monitor;
