//! Per-resource and per-job logging configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NameError;

/// Severity threshold attached to a resource or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic chatter.
    Debug,
    /// Normal operational events.
    Info,
    /// Something surprising but recoverable.
    Warn,
    /// A failure.
    Error,
}

impl LogLevel {
    /// The matching `tracing` level.
    #[must_use]
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(NameError::InvalidName {
                value: other.to_owned(),
                reason: "unknown log level".into(),
            }),
        }
    }
}

/// The `log_configuration` block carried by resource and job configs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfiguration {
    /// Threshold for events attributed to this entity.
    #[serde(default)]
    pub level: LogLevel,
}

impl LogConfiguration {
    /// A configuration pinned at the given level.
    #[must_use]
    pub fn at(level: LogLevel) -> Self {
        Self { level }
    }
}
