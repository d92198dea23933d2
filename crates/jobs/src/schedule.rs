//! Job schedules: fixed duration, cron, or continuous.
//!
//! Duration schedules pace on monotonic time (`tokio::time`), cron
//! schedules on wall-clock time. Missed cron ticks are skipped, never
//! queued: each wait computes the next instant strictly after "now".

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::JobError;

/// When a job fires.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fire first at `start + d`, then every `d` (monotonic).
    Duration(Duration),
    /// Fire at each wall-clock instant matching the expression.
    Cron(Box<cron::Schedule>),
    /// Fire as fast as the previous invocation returns.
    Continuous,
}

impl Schedule {
    /// The next wall-clock fire strictly after `now` (cron only).
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&now).next(),
            Self::Duration(_) | Self::Continuous => None,
        }
    }

    /// Whether this schedule paces at all.
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous)
    }
}

impl FromStr for Schedule {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(JobError::InvalidSchedule {
                value: s.to_owned(),
                reason: "empty schedule".into(),
            });
        }

        if trimmed.eq_ignore_ascii_case("continuous") {
            return Ok(Self::Continuous);
        }

        // Cron expressions contain whitespace between fields; durations
        // and the keyword never do.
        if trimmed.contains(char::is_whitespace) {
            let fields = trimmed.split_whitespace().count();
            // Five-field classic cron gets seconds prepended; six fields
            // already carry seconds precision.
            let normalized = if fields == 5 {
                format!("0 {trimmed}")
            } else {
                trimmed.to_owned()
            };
            let schedule =
                cron::Schedule::from_str(&normalized).map_err(|e| JobError::InvalidSchedule {
                    value: s.to_owned(),
                    reason: e.to_string(),
                })?;
            return Ok(Self::Cron(Box::new(schedule)));
        }

        let duration = humantime::parse_duration(trimmed).map_err(|e| JobError::InvalidSchedule {
            value: s.to_owned(),
            reason: e.to_string(),
        })?;
        if duration.is_zero() {
            return Err(JobError::InvalidSchedule {
                value: s.to_owned(),
                reason: "duration must be positive".into(),
            });
        }
        Ok(Self::Duration(duration))
    }
}
