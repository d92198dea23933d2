//! Resource error taxonomy.
//!
//! These variants are the contract surfaced through the facade and the
//! job history; several display strings are load-bearing (tests and
//! downstream tooling match on them).

use std::time::Duration;

/// Errors for resource lookup, construction, and invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// A name lookup missed entirely.
    #[error("resource {name:?} not found")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// The node exists but one or more strong dependencies are not ready.
    #[error("resource {name:?} has unresolved dependencies: {missing:?}")]
    Unresolved {
        /// The blocked node.
        name: String,
        /// The dependencies that are missing or not ready.
        missing: Vec<String>,
    },

    /// A bare dependency name matched resources on more than one source.
    #[error("dependency {name:?} is ambiguous; candidates: {candidates:?}")]
    Ambiguous {
        /// The bare name as written in the config.
        name: String,
        /// Every fully-qualified name it matched.
        candidates: Vec<String>,
    },

    /// The constructor or module returned an error; carried verbatim.
    #[error("resource construction failed: {message}")]
    ConstructionFailed {
        /// The constructor's error, unaltered.
        message: String,
    },

    /// The model's validator rejected the config.
    #[error("config validation failed: {message}")]
    ValidationFailed {
        /// The validator's reason.
        message: String,
    },

    /// Construction or close exceeded its budget.
    #[error("timed out after {budget:?}")]
    Timeout {
        /// The budget that was exceeded.
        budget: Duration,
    },

    /// The resource does not implement the generic command capability.
    /// The display string is fixed; callers match on it.
    #[error("DoCommand unimplemented")]
    DoCommandUnimplemented,

    /// The requested method is not in the resource's API method table.
    /// The display string is fixed; callers match on it.
    #[error("method unimplemented")]
    MethodUnimplemented {
        /// The method that was requested.
        method: String,
    },

    /// A remote machine could not be reached.
    #[error("remote {remote:?} unavailable: {message}")]
    RemoteUnavailable {
        /// The remote's configured name.
        remote: String,
        /// Underlying dial/call failure.
        message: String,
    },

    /// The resource does not support in-place reconfiguration; the
    /// engine rebuilds instead.
    #[error("resource does not support reconfiguration")]
    NotReconfigurable,

    /// Two configs declared the same fully-qualified name.
    #[error("duplicate resource name {name:?}")]
    DuplicateName {
        /// The offending name.
        name: String,
    },

    /// A driver-defined failure.
    #[error("{0}")]
    Other(String),
}

impl ResourceError {
    /// Construction failure wrapping an arbitrary error verbatim.
    #[must_use]
    pub fn construction(err: impl std::fmt::Display) -> Self {
        Self::ConstructionFailed {
            message: err.to_string(),
        }
    }

    /// Validation failure with a reason.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: reason.into(),
        }
    }

    /// Whether a retry may succeed without a config change (missing or
    /// unresolved targets reappear as the machine converges).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Unresolved { .. } | Self::RemoteUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_command_unimplemented_exact_string() {
        assert_eq!(
            ResourceError::DoCommandUnimplemented.to_string(),
            "DoCommand unimplemented"
        );
    }

    #[test]
    fn method_unimplemented_exact_string() {
        let err = ResourceError::MethodUnimplemented {
            method: "GetReadings".into(),
        };
        assert_eq!(err.to_string(), "method unimplemented");
    }

    #[test]
    fn unresolved_lists_missing_deps() {
        let err = ResourceError::Unresolved {
            name: "arm1".into(),
            missing: vec!["base1".into(), "board1".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("base1"));
        assert!(msg.contains("board1"));
    }

    #[test]
    fn transient_classification() {
        assert!(
            ResourceError::NotFound { name: "x".into() }.is_transient()
        );
        assert!(
            !ResourceError::ConstructionFailed {
                message: "boom".into()
            }
            .is_transient()
        );
    }
}
