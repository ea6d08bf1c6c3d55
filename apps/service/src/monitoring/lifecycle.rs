use anyhow::{Result, anyhow};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::scheduler::MonitoringScheduler;

/// Observable state of a started scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Handle to a scheduler running in the background.
///
/// Stopping is cooperative: the loop exits at its next wait and lets probes
/// already in flight finish. A stopped scheduler cannot be restarted.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitoringScheduler {
    /// Spawn the scheduler loop on the current runtime
    pub fn start(self) -> MonitorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        info!("Monitoring scheduler started");
        MonitorHandle { stop_tx, task }
    }
}

impl MonitorHandle {
    /// Raise the stop signal without waiting
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> SchedulerState {
        if self.task.is_finished() { SchedulerState::Stopped } else { SchedulerState::Running }
    }

    /// Stop and wait for the loop and its in-flight checks to finish
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.task.await.map_err(|e| anyhow!("Monitoring loop failed: {}", e))?;
        info!("Monitoring scheduler shut down");
        Ok(())
    }
}
