//! HaiLanGo media job engine.
//!
//! - [`JobStore`] / [`InMemoryJobStore`]: concurrency-safe job table
//!   enforcing the lifecycle state machine.
//! - [`JobProcessor`]: drives one job from pending to a terminal state.
//! - [`MediaBackend`]: the seam where OCR/TTS/STT work happens;
//!   [`SimulatedBackend`] stands in for real providers.
//! - [`ProgressNotifier`]: publishes progress to the notification hub.
//! - [`JobService`]: the engine API used by the HTTP layer.

pub mod backend;
pub mod notifier;
pub mod processor;
mod record;
pub mod service;
pub mod simulated;
pub mod store;

pub use backend::{BackendError, MediaBackend};
pub use notifier::{BatchProgress, ProgressNotifier};
pub use processor::{JobProcessor, ProgressReporter};
pub use service::JobService;
pub use simulated::{SimulatedBackend, SimulationConfig};
pub use store::{InMemoryJobStore, JobStore};
