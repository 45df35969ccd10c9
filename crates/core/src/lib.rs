//! Domain types shared by the HaiLanGo job engine, notification hub and API.
//!
//! This crate has no runtime dependencies on tokio or axum; everything here is
//! plain data plus validation.

pub mod error;
pub mod job;
pub mod media;
pub mod message_types;
pub mod types;
