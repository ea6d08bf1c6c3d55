use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use super::executor::MonitoringExecutor;
use super::types::{CheckResult, Target};

/// Append-only sink for check results.
///
/// Implementations only insert. Concurrent `save` calls from the scheduler
/// and from on-demand checks must both land in history.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn save(&self, result: &CheckResult) -> Result<()>;
}

/// Probe `target` and persist the outcome, handing back both.
///
/// For interactive callers that must report a result which was not stored.
pub async fn check_and_record(
    executor: &MonitoringExecutor,
    recorder: &dyn ResultRecorder,
    target: &Target,
) -> (CheckResult, Result<()>) {
    let result = executor.execute_check(target).await;

    if !result.is_up() {
        warn!(site = target.id, url = %target.address, "Site is DOWN: {}", result);
    }

    let saved = recorder.save(&result).await;
    if saved.is_ok() {
        info!(site = target.id, up = result.is_up(), "Saved check record");
    }

    (result, saved)
}

/// Probe `target` and persist the outcome.
///
/// Used by the scheduler. A recorder failure is logged and the result is
/// still returned to the caller.
pub async fn run_check(
    executor: &MonitoringExecutor,
    recorder: &dyn ResultRecorder,
    target: &Target,
) -> CheckResult {
    let (result, saved) = check_and_record(executor, recorder, target).await;

    if let Err(e) = saved {
        error!(site = target.id, url = %target.address, "Failed to save check record: {:#}", e);
    }

    result
}
