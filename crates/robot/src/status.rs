//! Machine status snapshots.

use std::collections::HashMap;

use serde::Serialize;

use chassis_jobs::JobRuns;

/// One resource's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    /// The fully-qualified name.
    pub name: String,
    /// `configuring`, `ready`, `unresolved`, `errored`, or `removing`.
    pub state: String,
    /// The most recent error, if the resource is not healthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A point-in-time snapshot of the whole machine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MachineStatus {
    /// Every graph node, sorted by name.
    pub resources: Vec<ResourceStatus>,
    /// Per-job run history.
    pub jobs: HashMap<String, JobRuns>,
}

impl MachineStatus {
    /// Status entry for one name, if present.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceStatus> {
        self.resources.iter().find(|r| r.name == name)
    }
}
