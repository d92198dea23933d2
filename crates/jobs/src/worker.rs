//! The per-job worker loop.
//!
//! One worker task per configured job. The loop: wait for the next fire
//! (honoring cancellation), re-read the current parameters so
//! modifications land at the next fire rather than mid-flight, resolve
//! the target, dispatch, record the outcome. Invocations run in their
//! own task so a panicking driver is a recorded failure, not a dead
//! worker.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use chassis_core::{LogLevel, Name};
use chassis_resource::{CommandMap, Registry, Resource, ResourceError};

use crate::history::SharedHistory;
use crate::schedule::Schedule;

/// A job target resolved through the facade at fire time.
pub struct ResolvedTarget {
    /// The target's fully-qualified name; carries the API used for
    /// method-table lookup.
    pub name: Name,
    /// The live instance.
    pub resource: Arc<dyn Resource>,
}

/// How workers look up their target each fire.
///
/// Implemented by the robot facade. Lookups happen against a live graph
/// mid-reconfigure, so absence is transient and workers tolerate it.
pub trait ResourceResolver: Send + Sync + 'static {
    /// Resolve a short resource name to a ready instance.
    fn resolve(&self, resource: &str) -> Result<ResolvedTarget, ResourceError>;
}

/// Parameters a worker re-reads at every fire.
#[derive(Clone)]
pub(crate) struct JobParams {
    pub schedule: Schedule,
    pub resource: String,
    pub method: String,
    pub command: CommandMap,
    pub level: LogLevel,
}

pub(crate) struct JobWorker {
    pub name: String,
    pub registry: Arc<Registry>,
    pub resolver: Arc<dyn ResourceResolver>,
    pub params: watch::Receiver<JobParams>,
    pub history: SharedHistory,
    pub cancel: CancellationToken,
}

impl JobWorker {
    pub async fn run(mut self) {
        tracing::debug!(job = %self.name, "job worker started");
        loop {
            let schedule = self.params.borrow_and_update().schedule.clone();
            if !self.wait_for_fire(&schedule).await {
                break;
            }
            // Re-read so schedule/command/level changes apply at this
            // fire, never retroactively.
            let params = self.params.borrow_and_update().clone();
            self.fire(&params).await;
        }
        tracing::debug!(job = %self.name, "job worker stopped");
    }

    /// Sleep until the next fire. Returns false on cancellation.
    async fn wait_for_fire(&self, schedule: &Schedule) -> bool {
        match schedule {
            Schedule::Duration(period) => {
                tokio::select! {
                    () = self.cancel.cancelled() => false,
                    () = tokio::time::sleep(*period) => true,
                }
            }
            Schedule::Cron(_) => {
                let now = Utc::now();
                let Some(next) = schedule.next_after(now) else {
                    tracing::warn!(job = %self.name, "cron schedule has no future fire");
                    return false;
                };
                let until = (next - now).to_std().unwrap_or_default();
                tokio::select! {
                    () = self.cancel.cancelled() => false,
                    () = tokio::time::sleep(until) => true,
                }
            }
            Schedule::Continuous => {
                // Back-to-back, with a cooperative yield so a continuous
                // job cannot starve the other workers.
                tokio::task::yield_now().await;
                !self.cancel.is_cancelled()
            }
        }
    }

    async fn fire(&self, params: &JobParams) {
        let target = match self.resolver.resolve(&params.resource) {
            Ok(target) => target,
            Err(err) => {
                tracing::error!(job = %self.name, resource = %params.resource, error = %err,
                    "Could not get resource");
                self.history.lock().record_failure(Utc::now());
                return;
            }
        };

        emit_at(params.level, &self.name, "Job triggered");

        let outcome = self.invoke(&target, params).await;
        match outcome {
            Ok(()) => {
                emit_at(params.level, &self.name, "Job succeeded");
                self.history.lock().record_success(Utc::now());
            }
            Err(reason) => {
                tracing::error!(job = %self.name, error = %reason, "Job failed");
                self.history.lock().record_failure(Utc::now());
            }
        }
    }

    /// Dispatch the configured method inside its own task so panics are
    /// contained and reported as failures.
    async fn invoke(&self, target: &ResolvedTarget, params: &JobParams) -> Result<(), String> {
        let resource = target.resource.clone();
        let handle = if params.method == "DoCommand" {
            let command = params.command.clone();
            tokio::spawn(async move { resource.do_command(&command).await.map(|_| ()) })
        } else {
            let Some(handler) = self.registry.method(&target.name.api, &params.method) else {
                return Err(ResourceError::MethodUnimplemented {
                    method: params.method.clone(),
                }
                .to_string());
            };
            // Non-DoCommand methods take no arguments.
            tokio::spawn(async move { handler(resource, CommandMap::new()).await.map(|_| ()) })
        };

        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(join_err) if join_err.is_panic() => {
                Err(format!("method panicked: {}", panic_message(join_err)))
            }
            Err(_) => Err("invocation cancelled".to_owned()),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Emit a job event at the job's configured level. `tracing` levels are
/// static per call site, so the dynamic level picks the site.
fn emit_at(level: LogLevel, job: &str, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(job = %job, "{message}"),
        LogLevel::Info => tracing::info!(job = %job, "{message}"),
        LogLevel::Warn => tracing::warn!(job = %job, "{message}"),
        LogLevel::Error => tracing::error!(job = %job, "{message}"),
    }
}
