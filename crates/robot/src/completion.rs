//! The background completion worker.
//!
//! Retries nodes that are unresolved (missing or offline dependencies)
//! or errored. Wakes on three signals: a remote reporting a changed
//! resource set, an explicit trigger from the facade, or a timer.
//! Each wake re-runs the build and weak-dependency phases over whatever
//! still needs work; resources that come up wake their dependents in
//! the same pass.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::reconfigure;
use crate::robot::RobotInner;

pub(crate) async fn run(inner: Arc<RobotInner>, mut trigger_rx: mpsc::Receiver<()>) {
    let mut interval = tokio::time::interval(inner.options.completion_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it so a fresh machine
    // does not run an empty pass.
    interval.tick().await;

    tracing::debug!("completion worker started");
    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => break,
            _ = interval.tick() => {}
            received = trigger_rx.recv() => {
                if received.is_none() {
                    break;
                }
                // Collapse a burst of triggers into one pass.
                while trigger_rx.try_recv().is_ok() {}
            }
        }
        reconfigure::completion_pass(&inner).await;
    }
    tracing::debug!("completion worker stopped");
}
