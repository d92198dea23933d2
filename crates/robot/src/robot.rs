//! The machine facade.
//!
//! [`Robot`] wires the pieces together: the shared dependency graph,
//! the serialized reconfiguration engine, the completion worker, the
//! job manager, remotes, and managed processes.
//!
//! # Locking
//!
//! - `shared.graph` is a read/write lock; job workers and lookups take
//!   short read locks, only the engine writes. Guards are never held
//!   across an await.
//! - `state` (applied config, remotes, processes, weak-dep bookkeeping)
//!   is a tokio mutex that serializes reconfiguration: the facade's
//!   `reconfigure`, the completion worker, and `close` all take it, so
//!   at most one of them mutates the machine at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chassis_config::Config;
use chassis_core::Name;
use chassis_jobs::{JobManager, ResolvedTarget, ResourceResolver};
use chassis_resource::{Graph, NodeState, Registry, Resource, ResourceError};

use crate::completion;
use crate::error::RobotError;
use crate::module::ModuleManager;
use crate::options::RobotOptions;
use crate::reconfigure::{self, AppliedState, DepResolution};
use crate::remote::RemoteDialer;
use crate::status::{MachineStatus, ResourceStatus};

/// State shared between the facade, the engine, and job workers.
pub(crate) struct Shared {
    /// The live dependency graph.
    pub graph: RwLock<Graph>,
    /// Names of remotes configured with `prefix: true`; their exports
    /// are not reachable by bare name.
    pub prefixed_remotes: RwLock<HashSet<String>>,
}

pub(crate) struct RobotInner {
    pub registry: Arc<Registry>,
    pub module_manager: Option<Arc<dyn ModuleManager>>,
    pub remote_dialer: Option<Arc<dyn RemoteDialer>>,
    pub options: RobotOptions,
    pub shared: Arc<Shared>,
    /// Serializes reconfiguration (facade, completion worker, close).
    pub state: tokio::sync::Mutex<AppliedState>,
    pub jobs: tokio::sync::Mutex<JobManager>,
    /// Wakes the completion worker out of band.
    pub trigger_tx: mpsc::Sender<()>,
    pub cancel: CancellationToken,
    pub closed: AtomicBool,
}

/// Resolves job targets against the live graph.
struct GraphResolver {
    shared: Arc<Shared>,
}

impl ResourceResolver for GraphResolver {
    fn resolve(&self, resource: &str) -> Result<ResolvedTarget, ResourceError> {
        let graph = self.shared.graph.read();
        let prefixed = self.shared.prefixed_remotes.read();
        match reconfigure::resolve_dep(&graph, &prefixed, resource) {
            DepResolution::One(name) => {
                let node = graph.node(&name).ok_or_else(|| ResourceError::NotFound {
                    name: resource.to_owned(),
                })?;
                let instance = node.read().resource()?;
                Ok(ResolvedTarget {
                    name,
                    resource: instance,
                })
            }
            DepResolution::Missing => Err(ResourceError::NotFound {
                name: resource.to_owned(),
            }),
            DepResolution::Ambiguous(candidates) => Err(ResourceError::Ambiguous {
                name: resource.to_owned(),
                candidates: candidates.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

/// Builder for a [`Robot`].
pub struct RobotBuilder {
    registry: Arc<Registry>,
    module_manager: Option<Arc<dyn ModuleManager>>,
    remote_dialer: Option<Arc<dyn RemoteDialer>>,
    options: RobotOptions,
}

impl RobotBuilder {
    /// Start from a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            module_manager: None,
            remote_dialer: None,
            options: RobotOptions::default(),
        }
    }

    /// Attach the out-of-process module host.
    #[must_use]
    pub fn with_module_manager(mut self, manager: Arc<dyn ModuleManager>) -> Self {
        self.module_manager = Some(manager);
        self
    }

    /// Attach the remote dialer.
    #[must_use]
    pub fn with_remote_dialer(mut self, dialer: Arc<dyn RemoteDialer>) -> Self {
        self.remote_dialer = Some(dialer);
        self
    }

    /// Override the machine tunables.
    #[must_use]
    pub fn with_options(mut self, options: RobotOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the machine and start its background workers.
    #[must_use]
    pub fn build(self) -> Robot {
        let shared = Arc::new(Shared {
            graph: RwLock::new(Graph::new()),
            prefixed_remotes: RwLock::new(HashSet::new()),
        });
        let resolver = Arc::new(GraphResolver {
            shared: shared.clone(),
        });
        let jobs = JobManager::new(self.registry.clone(), resolver);
        let (trigger_tx, trigger_rx) = mpsc::channel(8);

        let inner = Arc::new(RobotInner {
            registry: self.registry,
            module_manager: self.module_manager,
            remote_dialer: self.remote_dialer,
            options: self.options,
            shared,
            state: tokio::sync::Mutex::new(AppliedState::new()),
            jobs: tokio::sync::Mutex::new(jobs),
            trigger_tx,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        let completion_task = tokio::spawn(completion::run(inner.clone(), trigger_rx));

        Robot {
            inner,
            completion_task: tokio::sync::Mutex::new(Some(completion_task)),
        }
    }
}

/// A running machine.
pub struct Robot {
    inner: Arc<RobotInner>,
    completion_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Robot {
    /// A machine with default options and no module host or remotes.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        RobotBuilder::new(registry).build()
    }

    /// Start building a machine.
    #[must_use]
    pub fn builder(registry: Arc<Registry>) -> RobotBuilder {
        RobotBuilder::new(registry)
    }

    /// Apply a new configuration document.
    ///
    /// Serialized: a second call waits for the first to finish its
    /// foreground phases. Partial failure is not fatal: the returned
    /// [`RobotError::Incomplete`] enumerates every node that is not
    /// ready while the rest of the machine keeps running.
    pub async fn reconfigure(&self, config: Config) -> Result<(), RobotError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RobotError::Closed);
        }
        let mut state = self.inner.state.lock().await;
        reconfigure::apply(&self.inner, &mut state, config).await
    }

    /// Look up a ready resource by fully-qualified name.
    pub fn resource_by_name(&self, name: &Name) -> Result<Arc<dyn Resource>, ResourceError> {
        let graph = self.inner.shared.graph.read();
        let node = graph.node(name).ok_or_else(|| ResourceError::NotFound {
            name: name.to_string(),
        })?;
        let guard = node.read();
        guard.resource()
    }

    /// Look up a ready resource by a short name string, the way job
    /// targets and `depends_on` entries are written.
    pub fn resource_by_short_name(&self, short: &str) -> Result<Arc<dyn Resource>, ResourceError> {
        let graph = self.inner.shared.graph.read();
        let prefixed = self.inner.shared.prefixed_remotes.read();
        match reconfigure::resolve_dep(&graph, &prefixed, short) {
            DepResolution::One(name) => {
                let node = graph.node(&name).ok_or_else(|| ResourceError::NotFound {
                    name: short.to_owned(),
                })?;
                let guard = node.read();
                guard.resource()
            }
            DepResolution::Missing => Err(ResourceError::NotFound {
                name: short.to_owned(),
            }),
            DepResolution::Ambiguous(candidates) => Err(ResourceError::Ambiguous {
                name: short.to_owned(),
                candidates: candidates.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    /// Every ready resource name, local and imported, sorted.
    #[must_use]
    pub fn resource_names(&self) -> Vec<Name> {
        self.inner
            .shared
            .graph
            .read()
            .names_in_state(NodeState::Ready)
    }

    /// Snapshot of per-resource state and per-job history.
    pub async fn machine_status(&self) -> MachineStatus {
        let resources = {
            let graph = self.inner.shared.graph.read();
            graph
                .names()
                .into_iter()
                .filter_map(|name| {
                    graph.node(&name).map(|node| {
                        let guard = node.read();
                        ResourceStatus {
                            name: name.to_string(),
                            state: guard.state().to_string(),
                            error: guard.last_err().map(str::to_owned),
                        }
                    })
                })
                .collect()
        };
        let jobs = self.inner.jobs.lock().await.histories();
        MachineStatus { resources, jobs }
    }

    /// Wake the completion worker now instead of at its next tick.
    pub fn trigger_completion(&self) {
        let _ = self.inner.trigger_tx.try_send(());
    }

    /// Shut the machine down: jobs first, then resources in
    /// reverse-topological order, then remotes, then processes.
    /// Idempotent; failures are reported but never block shutdown.
    pub async fn close(&self) -> Result<(), RobotError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("closing robot");
        self.inner.cancel.cancel();

        if let Some(task) = self.completion_task.lock().await.take() {
            let _ = task.await;
        }

        // Take the reconfigure lock before stopping jobs so an in-flight
        // reconfiguration cannot restart workers behind our back.
        let mut state = self.inner.state.lock().await;
        self.inner.jobs.lock().await.close().await;
        let failures = reconfigure::close_all(&self.inner, &mut state).await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RobotError::CloseFailed { failures })
        }
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("resources", &self.resource_names().len())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}
