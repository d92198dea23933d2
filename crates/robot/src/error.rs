//! Machine-level errors.

use chassis_config::ConfigError;
use chassis_resource::ResourceError;

/// One node (or remote) that did not reach ready state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// The fully-qualified name (or remote name).
    pub name: String,
    /// The error, as surfaced by the node.
    pub error: String,
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Errors from the machine facade.
#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    /// The supplied document was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resource-level failure surfaced directly.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Reconfiguration finished, but some nodes are errored or
    /// unresolved. Ready resources remain fully usable; the completion
    /// worker keeps retrying the rest.
    #[error("reconfiguration incomplete, {} resource(s) not ready: {}",
        failures.len(), format_failures(failures))]
    Incomplete {
        /// Every node that is not ready, with its reason.
        failures: Vec<NodeFailure>,
    },

    /// Shutdown completed, but some resources failed to close cleanly.
    /// Everything was still torn down.
    #[error("close finished with {} failure(s): {}", failures.len(), format_failures(failures))]
    CloseFailed {
        /// Every close failure, with its reason.
        failures: Vec<NodeFailure>,
    },

    /// The machine is already closed.
    #[error("robot is closed")]
    Closed,
}

fn format_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
