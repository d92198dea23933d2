//! Bounded run history per job.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Ring size used when a job does not override it.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Shared handle to one job's history; the worker writes, the facade
/// snapshots.
pub type SharedHistory = Arc<Mutex<JobHistory>>;

/// Snapshot of a job's recent outcomes, as exposed by machine status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobRuns {
    /// Timestamps of recent successful invocations, oldest first.
    pub recent_successful_runs: Vec<DateTime<Utc>>,
    /// Timestamps of recent failed invocations, oldest first.
    pub recent_failed_runs: Vec<DateTime<Utc>>,
}

/// Bounded ring buffers of success/failure timestamps.
#[derive(Debug)]
pub struct JobHistory {
    successes: VecDeque<DateTime<Utc>>,
    failures: VecDeque<DateTime<Utc>>,
    capacity: usize,
}

impl JobHistory {
    /// A history bounded at `capacity` entries per ring.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            successes: VecDeque::with_capacity(capacity),
            failures: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Shared, default-capacity history.
    #[must_use]
    pub fn shared() -> SharedHistory {
        Arc::new(Mutex::new(Self::new(DEFAULT_HISTORY_CAPACITY)))
    }

    /// Record a successful run.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        push_bounded(&mut self.successes, at, self.capacity);
    }

    /// Record a failed run.
    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        push_bounded(&mut self.failures, at, self.capacity);
    }

    /// Total runs currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Whether nothing has run yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }

    /// Copy out the rings, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> JobRuns {
        JobRuns {
            recent_successful_runs: self.successes.iter().copied().collect(),
            recent_failed_runs: self.failures.iter().copied().collect(),
        }
    }
}

fn push_bounded(ring: &mut VecDeque<DateTime<Utc>>, at: DateTime<Utc>, capacity: usize) {
    if ring.len() == capacity {
        ring.pop_front();
    }
    ring.push_back(at);
}
