//! # Chassis Robot
//!
//! The machine itself: a facade over the resource graph, the
//! diff-driven reconfiguration engine, the background completion worker
//! that retries unresolved resources, remote machine imports, managed OS
//! processes, and the job scheduler.
//!
//! A [`Robot`] is built from a [`Registry`](chassis_resource::Registry)
//! and fed [`Config`](chassis_config::Config) documents through
//! [`Robot::reconfigure`]. Between reconfigurations it answers resource
//! lookups against a live graph and keeps jobs firing. A single
//! construction failure never takes the machine down: the failing node
//! is reported, everything else keeps running, and the completion worker
//! keeps retrying.

pub mod error;
pub mod module;
pub mod options;
pub mod remote;
pub mod robot;
pub mod status;

mod completion;
mod process;
mod reconfigure;

pub use error::{NodeFailure, RobotError};
pub use module::ModuleManager;
pub use options::RobotOptions;
pub use remote::{RemoteDialer, RemoteRobot};
pub use robot::{Robot, RobotBuilder};
pub use status::{MachineStatus, ResourceStatus};

/// Result type for machine operations.
pub type Result<T> = std::result::Result<T, RobotError>;
