//! The configuration document model.
//!
//! Field names are part of the external contract and match the JSON
//! document users write (`depends_on`, `exe_path`, `one_shot`, ...).
//! Attribute maps are carried as raw `serde_json` trees: the core never
//! interprets them, it hands them to the resource's validator and
//! constructor untouched so numeric int/float distinctions survive.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chassis_core::{Api, LogConfiguration, LogLevel, Model, Name, NameError};

use crate::error::ConfigError;

/// Configuration for a single resource (component or service).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Short, user-chosen name, unique within the machine.
    pub name: String,
    /// The API surface this resource exposes.
    #[serde(alias = "type")]
    pub api: Api,
    /// The concrete implementation to construct.
    pub model: Model,
    /// Opaque attribute tree handed to the implementation.
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
    /// Names of resources this one explicitly depends on. Entries may be
    /// bare short names or remote-qualified (`foo:pieceArm`).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Frame-system placement, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Value>,
    /// Per-resource log threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<LogConfiguration>,
    /// Dependencies added by the model's validator, written the same way
    /// as `depends_on`. Not part of the document; populated during
    /// reconfiguration.
    #[serde(skip)]
    pub implicit_depends_on: Vec<String>,
}

impl ResourceConfig {
    /// The fully-qualified name this config declares.
    pub fn resource_name(&self) -> Result<Name, NameError> {
        Name::new(self.api.clone(), self.name.clone())
    }

    /// The log level for events attributed to this resource.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_configuration
            .map_or(LogLevel::Info, |c| c.level)
    }

    /// Whether two configs declare the same resource identically.
    ///
    /// Compares only user-declared fields; validator-computed implicit
    /// dependencies are recomputed every pass and do not make a config
    /// "modified".
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.name == other.name
            && self.api == other.api
            && self.model == other.model
            && self.attributes == other.attributes
            && self.depends_on == other.depends_on
            && self.frame == other.frame
            && self.log_configuration == other.log_configuration
    }
}

/// Configuration for a connection to a remote machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Local name for the remote; also the default import prefix.
    pub name: String,
    /// Dial address, opaque to the core.
    pub address: String,
    /// When true, imported names keep the remote's prefix; when false,
    /// unambiguous names are also reachable bare.
    #[serde(default)]
    pub prefix: bool,
    /// Authentication material, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// Frame-system placement, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Value>,
}

/// Where a module's executable comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// A path on the local filesystem.
    Local,
    /// Resolved through the module registry.
    Registry,
}

impl Default for ModuleKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Configuration for an out-of-process module hosting resource models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Unique module name.
    pub name: String,
    /// Path to the module executable.
    pub exe_path: PathBuf,
    /// Log threshold forwarded to the module process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Local path or registry module.
    #[serde(rename = "type", default)]
    pub kind: ModuleKind,
}

/// Configuration for a managed OS process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Unique id for add/modify/remove tracking.
    pub id: String,
    /// Executable name or path.
    pub name: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Run once to completion instead of being kept alive.
    #[serde(default)]
    pub one_shot: bool,
    /// Forward the process's output to the machine log.
    #[serde(default)]
    pub log: bool,
}

/// Configuration for a scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name.
    pub name: String,
    /// `"continuous"`, a duration (`"5s"`), or a cron expression.
    pub schedule: String,
    /// Short name of the target resource.
    pub resource: String,
    /// Method to invoke on the target.
    pub method: String,
    /// Argument map for `DoCommand` dispatch.
    #[serde(default)]
    pub command: serde_json::Map<String, Value>,
    /// Per-job log threshold; job events default to debug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<LogConfiguration>,
}

impl JobConfig {
    /// The level `"Job triggered"` events are emitted at.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_configuration
            .map_or(LogLevel::Debug, |c| c.level)
    }
}

/// A full machine configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hardware-facing resources.
    #[serde(default)]
    pub components: Vec<ResourceConfig>,
    /// Software resources.
    #[serde(default)]
    pub services: Vec<ResourceConfig>,
    /// Connections to remote machines.
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    /// Out-of-process resource modules.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    /// Managed OS processes.
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
    /// Scheduled jobs.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Config {
    /// All resource configs, components first.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.components.iter().chain(self.services.iter())
    }

    /// Validate and normalize the document in place.
    ///
    /// Duplicate resource names, job names, and process ids are hard
    /// errors. Duplicate module names are logged and dropped, first one
    /// wins, so a machine with a bad module list still starts partially.
    pub fn ensure_valid(&mut self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for resource in self.resources() {
            let name = resource.resource_name()?;
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateResource {
                    name: name.to_string(),
                });
            }
        }

        let mut job_names = std::collections::HashSet::new();
        for job in &self.jobs {
            if !job_names.insert(job.name.clone()) {
                return Err(ConfigError::DuplicateJob {
                    name: job.name.clone(),
                });
            }
        }

        let mut process_ids = std::collections::HashSet::new();
        for process in &self.processes {
            if !process_ids.insert(process.id.clone()) {
                return Err(ConfigError::DuplicateProcess {
                    id: process.id.clone(),
                });
            }
        }

        let mut module_names = std::collections::HashSet::new();
        self.modules.retain(|module| {
            let fresh = module_names.insert(module.name.clone());
            if !fresh {
                tracing::error!(module = %module.name, "duplicate module name, keeping first");
            }
            fresh
        });

        Ok(())
    }

    /// Look up a resource config by its fully-qualified name.
    #[must_use]
    pub fn resource_by_name(&self, name: &Name) -> Option<&ResourceConfig> {
        self.resources()
            .find(|r| r.resource_name().is_ok_and(|n| &n == name))
    }
}
