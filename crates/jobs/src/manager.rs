//! Diff-driven lifecycle of job workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use chassis_config::{CollectionDiff, JobConfig};
use chassis_resource::Registry;

use crate::error::JobError;
use crate::history::{JobHistory, JobRuns, SharedHistory};
use crate::schedule::Schedule;
use crate::worker::{JobParams, JobWorker, ResourceResolver};

/// Tunables for the job manager.
#[derive(Debug, Clone)]
pub struct JobManagerOptions {
    /// Ring size for per-job run history.
    pub history_capacity: usize,
    /// How long a cancelled worker may drain an in-flight invocation
    /// before the manager gives up on joining it.
    pub close_timeout: Duration,
}

impl Default for JobManagerOptions {
    fn default() -> Self {
        Self {
            history_capacity: crate::history::DEFAULT_HISTORY_CAPACITY,
            close_timeout: Duration::from_secs(5),
        }
    }
}

struct WorkerHandle {
    params: watch::Sender<JobParams>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    history: SharedHistory,
}

/// Owns one worker task per configured job.
///
/// Driven by the reconfiguration engine through [`JobManager::reconfigure`]:
/// added jobs start workers, removed jobs cancel and drain them, modified
/// jobs receive their new parameters through a watch channel picked up at
/// the worker's next fire. A job whose schedule fails to parse is logged
/// and skipped; it does not fail the broader reconfiguration.
pub struct JobManager {
    registry: Arc<Registry>,
    resolver: Arc<dyn ResourceResolver>,
    options: JobManagerOptions,
    workers: HashMap<String, WorkerHandle>,
}

impl JobManager {
    /// A manager with default options.
    pub fn new(registry: Arc<Registry>, resolver: Arc<dyn ResourceResolver>) -> Self {
        Self::with_options(registry, resolver, JobManagerOptions::default())
    }

    /// A manager with explicit options.
    pub fn with_options(
        registry: Arc<Registry>,
        resolver: Arc<dyn ResourceResolver>,
        options: JobManagerOptions,
    ) -> Self {
        Self {
            registry,
            resolver,
            options,
            workers: HashMap::new(),
        }
    }

    /// Names of currently running jobs, sorted.
    #[must_use]
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of running workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no jobs are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Apply a job diff from the reconfiguration engine.
    pub async fn reconfigure(&mut self, diff: &CollectionDiff<JobConfig>) {
        for removed in &diff.removed {
            self.stop_worker(&removed.name).await;
        }
        for modified in &diff.modified {
            self.update_worker(modified);
        }
        for added in &diff.added {
            self.start_worker(added);
        }
    }

    /// Per-job history snapshots for machine status.
    #[must_use]
    pub fn histories(&self) -> HashMap<String, JobRuns> {
        self.workers
            .iter()
            .map(|(name, handle)| (name.clone(), handle.history.lock().snapshot()))
            .collect()
    }

    /// Stop every worker. Idempotent.
    pub async fn close(&mut self) {
        let names: Vec<String> = self.workers.keys().cloned().collect();
        for name in names {
            self.stop_worker(&name).await;
        }
    }

    fn start_worker(&mut self, config: &JobConfig) {
        let params = match job_params(config) {
            Ok(params) => params,
            Err(err) => {
                tracing::error!(job = %config.name, error = %err, "invalid job config, skipping");
                return;
            }
        };

        tracing::info!(job = %config.name, schedule = %config.schedule, "starting job");
        let (params_tx, params_rx) = watch::channel(params);
        let cancel = CancellationToken::new();
        let history = Arc::new(parking_lot::Mutex::new(JobHistory::new(
            self.options.history_capacity,
        )));

        let worker = JobWorker {
            name: config.name.clone(),
            registry: self.registry.clone(),
            resolver: self.resolver.clone(),
            params: params_rx,
            history: history.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        self.workers.insert(
            config.name.clone(),
            WorkerHandle {
                params: params_tx,
                cancel,
                task,
                history,
            },
        );
    }

    fn update_worker(&mut self, config: &JobConfig) {
        let Some(handle) = self.workers.get(&config.name) else {
            // The previous config for this name never produced a worker
            // (e.g. its schedule failed to parse); treat as an add.
            self.start_worker(config);
            return;
        };
        match job_params(config) {
            Ok(params) => {
                tracing::info!(job = %config.name, "updating job parameters");
                // Existing history is preserved; only the params change.
                let _ = handle.params.send(params);
            }
            Err(err) => {
                tracing::error!(job = %config.name, error = %err, "invalid job config, keeping previous parameters");
            }
        }
    }

    async fn stop_worker(&mut self, name: &str) {
        let Some(handle) = self.workers.remove(name) else {
            return;
        };
        tracing::info!(job = %name, "stopping job");
        handle.cancel.cancel();
        match tokio::time::timeout(self.options.close_timeout, handle.task).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(job = %name, "job worker did not drain in time, detaching");
            }
        }
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &self.job_names())
            .finish_non_exhaustive()
    }
}

fn job_params(config: &JobConfig) -> Result<JobParams, JobError> {
    let schedule: Schedule = config.schedule.parse()?;
    Ok(JobParams {
        schedule,
        resource: config.resource.clone(),
        method: config.method.clone(),
        command: config.command.clone(),
        level: config.log_level(),
    })
}
