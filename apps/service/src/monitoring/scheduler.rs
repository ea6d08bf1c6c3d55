use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::executor::MonitoringExecutor;
use super::ledger::{CheckLedger, DuePolicy};
use super::recorder::{ResultRecorder, run_check};
use super::registry::TargetRegistry;
use super::types::{Target, TargetId};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of the due-check cycle
    pub tick: Duration,
    /// Upper bound on probes running at the same time
    pub max_concurrent_checks: usize,
    pub due_policy: DuePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(1), max_concurrent_checks: 16, due_policy: DuePolicy::default() }
    }
}

/// Everything a spawned check needs, cheap to clone into each task
#[derive(Clone)]
struct CheckContext {
    executor: Arc<MonitoringExecutor>,
    recorder: Arc<dyn ResultRecorder>,
    ledger: Arc<CheckLedger>,
    permits: Arc<Semaphore>,
}

impl CheckContext {
    /// Probe, record, then update bookkeeping for one target. Nothing escapes
    /// this boundary: recorder errors are logged by `run_check`, panics are
    /// caught here.
    async fn check(self, target: Target, dispatched_at: Instant, stop: watch::Receiver<bool>) {
        let Ok(_permit) = self.permits.acquire_owned().await else {
            self.ledger.release(target.id);
            return;
        };

        if *stop.borrow() {
            debug!(site = target.id, "Stop requested, skipping queued check");
            self.ledger.release(target.id);
            return;
        }

        let outcome = AssertUnwindSafe(run_check(&self.executor, self.recorder.as_ref(), &target))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => self.ledger.complete(target.id, dispatched_at, result.is_up()),
            Err(_) => {
                error!(site = target.id, url = %target.address, "Check panicked, marking site as checked");
                self.ledger.complete(target.id, dispatched_at, false);
            }
        }
    }
}

/// Monitoring scheduler - decides every tick which sites are due and
/// dispatches their checks.
///
/// Each due site is checked in its own task, so a slow site never holds back
/// the others. A site with a check in flight is skipped until that check
/// finishes.
pub struct MonitoringScheduler {
    registry: Arc<dyn TargetRegistry>,
    context: CheckContext,
    tick: Duration,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(
        executor: Arc<MonitoringExecutor>,
        registry: Arc<dyn TargetRegistry>,
        recorder: Arc<dyn ResultRecorder>,
        config: SchedulerConfig,
    ) -> Self {
        let context = CheckContext {
            executor,
            recorder,
            ledger: Arc::new(CheckLedger::new(config.due_policy)),
            permits: Arc::new(Semaphore::new(config.max_concurrent_checks.max(1))),
        };

        Self { registry, context, tick: config.tick.max(Duration::from_millis(10)) }
    }

    /// Bookkeeping shared with the check tasks
    pub fn ledger(&self) -> Arc<CheckLedger> {
        self.context.ledger.clone()
    }

    /// Run until `stop` turns true or its sender is dropped.
    ///
    /// Checks already dispatched are awaited before returning; none is
    /// aborted.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(tick_ms = self.tick.as_millis() as u64, "Starting monitoring loop");

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut checks = JoinSet::new();

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        debug!("Stop handle dropped");
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            reap(&mut checks);
            self.run_tick(&mut checks, &stop).await;
        }

        info!(in_flight = checks.len(), "Monitoring loop stopping, waiting for in-flight checks");
        while let Some(joined) = checks.join_next().await {
            if let Err(e) = joined {
                error!("Check task failed: {}", e);
            }
        }
        info!("Monitoring loop stopped");
    }

    /// One due-check cycle
    async fn run_tick(&self, checks: &mut JoinSet<()>, stop: &watch::Receiver<bool>) {
        let now = Instant::now();

        let targets = match self.registry.list_all().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Failed to list sites, skipping this tick: {:#}", e);
                return;
            }
        };

        let live: HashSet<TargetId> = targets.iter().map(|t| t.id).collect();
        let listed = targets.len();
        let pruned = self.context.ledger.retain_targets(&live);
        let mut dispatched = 0;

        for target in targets {
            if !self.context.ledger.claim_if_due(&target, now) {
                continue;
            }

            debug!(site = target.id, url = %target.address, "Time to check");
            checks.spawn(self.context.clone().check(target, now, stop.clone()));
            dispatched += 1;
        }

        debug!(
            sites = listed,
            dispatched,
            pruned,
            in_flight = checks.len(),
            "Tick complete"
        );
    }
}

/// Collect finished check tasks so the set does not grow unbounded
fn reap(checks: &mut JoinSet<()>) {
    while let Some(joined) = checks.try_join_next() {
        if let Err(e) = joined {
            error!("Check task failed: {}", e);
        }
    }
}
