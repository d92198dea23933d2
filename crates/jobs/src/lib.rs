//! # Chassis Jobs
//!
//! The per-job scheduler. Each configured job owns one worker task that
//! fires on its schedule (a fixed duration, a cron expression with
//! seconds precision, or continuously), resolves its target resource
//! through the facade, dispatches the declared method, and records the
//! outcome in bounded ring buffers.
//!
//! Workers are deliberately hard to kill: a missing target, a failing
//! method, or a panicking driver records a failure and waits for the
//! next tick. Only removal from config or machine shutdown stops a job.

pub mod error;
pub mod history;
pub mod manager;
pub mod schedule;
mod worker;

pub use error::JobError;
pub use history::{JobHistory, JobRuns, SharedHistory, DEFAULT_HISTORY_CAPACITY};
pub use manager::{JobManager, JobManagerOptions};
pub use schedule::Schedule;
pub use worker::{ResolvedTarget, ResourceResolver};

/// Result type for job handling.
pub type Result<T> = std::result::Result<T, JobError>;
