//! Engagecast - daily social engagement under rate limits
//!
//! This library runs a day's follow/like/comment session: it discovers
//! targets, gates every action on daily caps, paces actions like a person
//! would, and checkpoints progress so an interrupted session resumes without
//! acting twice.

pub mod automation;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod executor;
pub mod generation;
pub mod logging;
pub mod mock;
pub mod orchestrator;
pub mod rate_limiter;
pub mod session;
pub mod stats;
pub mod timing;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{EngageError, Result};
pub use orchestrator::{Collaborators, DailyOrchestrator, RunOutcome, RunReport, StopSignal};
pub use types::{ActionKind, ActionRecord, Outcome, Target, TargetKind};
