//! WebSocket endpoint for real-time job progress.
//!
//! Provides the HTTP upgrade handler and the read/write pumps that connect
//! a socket to the notification [`Hub`](hailango_events::Hub).

mod handler;
pub mod pump;

pub use handler::ws_handler;
