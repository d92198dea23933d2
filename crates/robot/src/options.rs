//! Machine tunables.

use std::time::Duration;

/// Environment variable overriding the per-resource construction
/// timeout, in humantime format (`"90s"`, `"2m"`).
pub const CONSTRUCTION_TIMEOUT_ENV: &str = "RESOURCE_CONFIGURATION_TIMEOUT";

const DEFAULT_CONSTRUCTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables for a running machine.
#[derive(Debug, Clone)]
pub struct RobotOptions {
    /// Budget for one resource construction or in-place reconfigure.
    /// Exceeding it errors that node only, never the whole pass.
    pub construction_timeout: Duration,
    /// Budget for closing one resource during removal or shutdown.
    pub close_timeout: Duration,
    /// How often the completion worker retries unresolved and errored
    /// nodes when nothing else wakes it.
    pub completion_interval: Duration,
}

impl Default for RobotOptions {
    fn default() -> Self {
        Self {
            construction_timeout: construction_timeout_from_env(),
            close_timeout: Duration::from_secs(5),
            completion_interval: Duration::from_secs(5),
        }
    }
}

fn construction_timeout_from_env() -> Duration {
    match std::env::var(CONSTRUCTION_TIMEOUT_ENV) {
        Ok(raw) => match humantime::parse_duration(&raw) {
            Ok(timeout) => timeout,
            Err(err) => {
                tracing::warn!(value = %raw, error = %err,
                    "ignoring unparseable construction timeout override");
                DEFAULT_CONSTRUCTION_TIMEOUT
            }
        },
        Err(_) => DEFAULT_CONSTRUCTION_TIMEOUT,
    }
}
