//! Job configuration errors.

/// Errors raised while interpreting a job config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The schedule string is neither `continuous`, a duration, nor a
    /// cron expression.
    #[error("invalid schedule {value:?}: {reason}")]
    InvalidSchedule {
        /// The rejected schedule string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
