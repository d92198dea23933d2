//! Managed OS processes.
//!
//! Processes are a first-class parallel collection in the config,
//! keyed by id. A modified process is replaced: the old child is killed
//! before the new one starts. One-shot processes run to completion and
//! are not tracked after spawn; managed processes are killed on removal
//! and machine close.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use chassis_config::{CollectionDiff, ProcessConfig};

struct ManagedProcess {
    /// Present for managed (non-one-shot) processes only.
    child: Option<Child>,
}

/// Lifecycle owner for configured OS processes.
#[derive(Default)]
pub(crate) struct ProcessManager {
    processes: HashMap<String, ManagedProcess>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of tracked processes, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.processes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Apply a process diff. One-shot spawn failures are logged and
    /// swallowed; managed spawn failures are returned so the engine can
    /// surface them in the reconfigure report.
    pub async fn reconfigure(
        &mut self,
        diff: &CollectionDiff<ProcessConfig>,
    ) -> Vec<(String, String)> {
        let mut failures = Vec::new();

        for removed in &diff.removed {
            self.stop(&removed.id).await;
        }
        for modified in &diff.modified {
            // Replace: kill the old child, then start the new config.
            self.stop(&modified.id).await;
            if let Err(err) = self.start(modified).await {
                failures.push((modified.id.clone(), err));
            }
        }
        for added in &diff.added {
            if let Err(err) = self.start(added).await {
                failures.push((added.id.clone(), err));
            }
        }

        failures
    }

    /// Kill every managed child. Idempotent.
    pub async fn close(&mut self) {
        let ids = self.ids();
        for id in ids {
            self.stop(&id).await;
        }
    }

    async fn start(&mut self, config: &ProcessConfig) -> Result<(), String> {
        tracing::info!(process = %config.id, exe = %config.name, "starting process");

        let mut command = Command::new(&config.name);
        command.args(&config.args);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }
        if config.log {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        // Inside an AppImage the bundle's loader paths would leak into
        // children and break dynamically linked executables.
        if std::env::var_os("APPIMAGE").is_some() {
            command.env_remove("LD_LIBRARY_PATH").env_remove("LD_PRELOAD");
        }
        command.kill_on_drop(true);

        let spawned = command.spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                if config.one_shot {
                    tracing::error!(process = %config.id, error = %err,
                        "one-shot process failed to start");
                    return Ok(());
                }
                return Err(err.to_string());
            }
        };

        if config.log {
            forward_output(&config.id, &mut child);
        }

        if config.one_shot {
            // Run to completion in the background; nothing to track.
            let id = config.id.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => {
                        tracing::info!(process = %id, %status, "one-shot process finished");
                    }
                    Err(err) => {
                        tracing::error!(process = %id, error = %err, "one-shot process wait failed");
                    }
                }
            });
            self.processes.insert(config.id.clone(), ManagedProcess { child: None });
        } else {
            self.processes
                .insert(config.id.clone(), ManagedProcess { child: Some(child) });
        }

        Ok(())
    }

    async fn stop(&mut self, id: &str) {
        let Some(mut managed) = self.processes.remove(id) else {
            return;
        };
        if let Some(mut child) = managed.child.take() {
            tracing::info!(process = %id, "stopping process");
            if let Err(err) = child.kill().await {
                tracing::warn!(process = %id, error = %err, "failed to kill process");
            }
        }
    }
}

/// Stream a child's stdout/stderr into the machine log.
fn forward_output(id: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let id = id.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(process = %id, "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let id = id.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::error!(process = %id, "{line}");
            }
        });
    }
}
