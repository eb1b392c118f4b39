//! The credential-refresh-and-sync loop.

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{CycleReport, SkipReason, SyncOrchestrator, UserOutcome};
pub use scheduler::{Scheduler, DEFAULT_INTERVAL};
