//! Scheduler scenarios on tokio's paused clock
//!
//! These tests drive the real scheduler loop with in-memory doubles for the
//! transport, the site registry and the result store, then inspect when each
//! site was probed.
use anyhow::{Result, anyhow};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};

use super::checker::{CheckError, Checker};
use super::ledger::DuePolicy;
use super::{
    CheckResult, MonitoringExecutor, MonitoringScheduler, ResultRecorder, SchedulerConfig,
    SchedulerState, Target, TargetId, TargetRegistry, check_and_record, run_check,
};

#[derive(Debug, Clone)]
enum Step {
    Respond(u16),
    Fail(CheckError),
    Hang,
}

#[derive(Default)]
struct Plan {
    delay: Duration,
    scripted: VecDeque<Step>,
    fallback: Option<Step>,
}

/// Transport answering from a per-address script and logging every call
#[derive(Default)]
struct ScriptedChecker {
    plans: Mutex<HashMap<String, Plan>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedChecker {
    fn respond(&self, address: &str, status: u16) {
        self.plans.lock().unwrap().entry(address.to_string()).or_default().fallback =
            Some(Step::Respond(status));
    }

    fn script(&self, address: &str, steps: Vec<Step>) {
        self.plans.lock().unwrap().entry(address.to_string()).or_default().scripted = steps.into();
    }

    fn always(&self, address: &str, step: Step) {
        self.plans.lock().unwrap().entry(address.to_string()).or_default().fallback = Some(step);
    }

    fn delay(&self, address: &str, delay: Duration) {
        self.plans.lock().unwrap().entry(address.to_string()).or_default().delay = delay;
    }

    /// Whole seconds since `start` of every call to `address`
    fn offsets(&self, address: &str, start: Instant) -> Vec<u64> {
        let mut offsets: Vec<u64> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, at)| at.duration_since(start).as_secs())
            .collect();
        offsets.sort_unstable();
        offsets
    }
}

#[async_trait::async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, address: &str) -> Result<u16, CheckError> {
        self.calls.lock().unwrap().push((address.to_string(), Instant::now()));

        let (delay, step) = {
            let mut plans = self.plans.lock().unwrap();
            let plan = plans.entry(address.to_string()).or_default();
            let step = plan
                .scripted
                .pop_front()
                .or_else(|| plan.fallback.clone())
                .unwrap_or(Step::Respond(200));
            (plan.delay, step)
        };

        sleep(delay).await;
        match step {
            Step::Respond(status) => Ok(status),
            Step::Fail(e) => Err(e),
            Step::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
struct MemoryRegistry {
    targets: Mutex<Vec<Target>>,
    failures_left: AtomicUsize,
}

impl MemoryRegistry {
    fn with(targets: Vec<Target>) -> Arc<Self> {
        Arc::new(Self { targets: Mutex::new(targets), ..Self::default() })
    }

    fn add(&self, target: Target) {
        self.targets.lock().unwrap().push(target);
    }

    fn remove(&self, id: TargetId) {
        self.targets.lock().unwrap().retain(|t| t.id != id);
    }
}

#[async_trait::async_trait]
impl TargetRegistry for MemoryRegistry {
    async fn list_all(&self) -> Result<Vec<Target>> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.targets.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct MemoryRecorder {
    results: Mutex<Vec<CheckResult>>,
    failing: AtomicBool,
    panic_on: Option<TargetId>,
}

impl MemoryRecorder {
    fn results_for(&self, id: TargetId) -> Vec<CheckResult> {
        self.results.lock().unwrap().iter().filter(|r| r.target_id() == id).cloned().collect()
    }
}

#[async_trait::async_trait]
impl ResultRecorder for MemoryRecorder {
    async fn save(&self, result: &CheckResult) -> Result<()> {
        if self.panic_on == Some(result.target_id()) {
            panic!("recorder bug for site {}", result.target_id());
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("disk I/O error"));
        }
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}

fn target(id: TargetId, interval_secs: u64) -> Target {
    Target::new(id, address(id)).with_interval(Duration::from_secs(interval_secs))
}

fn address(id: TargetId) -> String {
    format!("https://site-{id}.example")
}

fn executor(checker: &Arc<ScriptedChecker>) -> Arc<MonitoringExecutor> {
    Arc::new(MonitoringExecutor::with_checker(checker.clone(), Duration::from_secs(10)))
}

fn scheduler(
    checker: &Arc<ScriptedChecker>,
    registry: &Arc<MemoryRegistry>,
    recorder: &Arc<MemoryRecorder>,
    config: SchedulerConfig,
) -> MonitoringScheduler {
    MonitoringScheduler::new(executor(checker), registry.clone(), recorder.clone(), config)
}

#[tokio::test(start_paused = true)]
async fn test_probes_follow_interval() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 5)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(10_500)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0, 5, 10]);
    assert_eq!(recorder.results_for(1).len(), 3);
    assert!(recorder.results_for(1).iter().all(CheckResult::is_up));
}

#[tokio::test(start_paused = true)]
async fn test_probe_count_stays_within_one_of_expected() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 3), target(2, 7)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_secs(30)).await;
    handle.shutdown().await.unwrap();

    for (id, interval) in [(1, 3), (2, 7)] {
        let expected = 30 / interval;
        let actual = checker.offsets(&address(id), start).len() as u64;
        assert!(
            actual + 1 >= expected && actual <= expected + 1,
            "site {id}: {actual} probes, expected {expected} ± 1"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_probe_is_not_retried_early() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.script(
        &address(1),
        vec![Step::Respond(200), Step::Fail(CheckError::Timeout), Step::Respond(200)],
    );
    let registry = MemoryRegistry::with(vec![target(1, 5)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(12_500)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0, 5, 10]);

    let results = recorder.results_for(1);
    assert_eq!(results.len(), 3);
    assert!(results[0].is_up());
    assert!(!results[1].is_up());
    assert_eq!(results[1].status_code(), 0);
    assert_eq!(results[1].error(), Some("timeout"));
    assert!(results[2].is_up());
}

#[tokio::test(start_paused = true)]
async fn test_slow_site_does_not_delay_others() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.delay(&address(1), Duration::from_secs(8));
    let registry = MemoryRegistry::with(vec![target(1, 1), target(2, 1)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(5_500)).await;

    assert_eq!(checker.offsets(&address(2), start), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(checker.offsets(&address(1), start), vec![0]);
    assert!(recorder.results_for(1).is_empty());

    handle.shutdown().await.unwrap();

    // The in-flight probe was allowed to finish during shutdown
    assert_eq!(recorder.results_for(1).len(), 1);
    assert!(recorder.results_for(1)[0].latency() >= Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_probe_is_never_duplicated() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.always(&address(1), Step::Hang);
    let registry = MemoryRegistry::with(vec![target(1, 1)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(9_500)).await;
    assert_eq!(checker.offsets(&address(1), start), vec![0]);
    assert!(recorder.results_for(1).is_empty());

    // Shutdown waits for the probe to hit the executor timeout
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0]);
    let results = recorder.results_for(1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error(), Some("timeout"));
    assert_eq!(results[0].status_code(), 0);
    assert!(results[0].latency() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_new_site_is_probed_on_next_tick() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 100)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(2_500)).await;
    registry.add(target(2, 100));
    sleep(Duration::from_secs(1)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0]);
    assert_eq!(checker.offsets(&address(2), start), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_removed_site_stops_being_probed() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 1), target(2, 1)]);
    let recorder = Arc::new(MemoryRecorder::default());

    let scheduler = scheduler(&checker, &registry, &recorder, SchedulerConfig::default());
    let ledger = scheduler.ledger();

    let start = Instant::now();
    let handle = scheduler.start();
    sleep(Duration::from_millis(2_500)).await;
    registry.remove(1);
    sleep(Duration::from_secs(3)).await;

    assert_eq!(handle.state(), SchedulerState::Running);
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0, 1, 2]);
    assert_eq!(checker.offsets(&address(2), start).len(), 6);
    assert!(ledger.last_checked(1).is_none());
    assert!(ledger.last_checked(2).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_registry_failure_skips_tick_only() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 100)]);
    registry.failures_left.store(2, Ordering::SeqCst);
    let recorder = Arc::new(MemoryRecorder::default());

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(3_500)).await;

    assert_eq!(handle.state(), SchedulerState::Running);
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_recorder_failure_still_counts_as_checked() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 5)]);
    let recorder = Arc::new(MemoryRecorder::default());
    recorder.failing.store(true, Ordering::SeqCst);

    let scheduler = scheduler(&checker, &registry, &recorder, SchedulerConfig::default());
    let ledger = scheduler.ledger();

    let start = Instant::now();
    let handle = scheduler.start();
    sleep(Duration::from_millis(3_500)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0]);
    assert!(recorder.results_for(1).is_empty());
    assert_eq!(ledger.last_checked(1), Some(start));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_site_is_isolated() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 1), target(2, 1)]);
    let recorder = Arc::new(MemoryRecorder { panic_on: Some(1), ..MemoryRecorder::default() });

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, SchedulerConfig::default()).start();
    sleep(Duration::from_millis(2_500)).await;

    assert_eq!(handle.state(), SchedulerState::Running);
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0, 1, 2]);
    assert_eq!(recorder.results_for(2).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_clamped_to_minimum() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 0)]);
    let recorder = Arc::new(MemoryRecorder::default());
    let config = SchedulerConfig {
        tick: Duration::from_millis(250),
        due_policy: DuePolicy { min_interval: Duration::from_secs(1), retry_failed_after: None },
        ..SchedulerConfig::default()
    };

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, config).start();
    sleep(Duration::from_millis(3_100)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_window_after_failure() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.respond(&address(1), 503);
    let registry = MemoryRegistry::with(vec![target(1, 10)]);
    let recorder = Arc::new(MemoryRecorder::default());
    let config = SchedulerConfig {
        due_policy: DuePolicy {
            min_interval: Duration::from_secs(1),
            retry_failed_after: Some(Duration::from_secs(2)),
        },
        ..SchedulerConfig::default()
    };

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, config).start();
    sleep(Duration::from_millis(5_500)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(checker.offsets(&address(1), start), vec![0, 2, 4]);
    assert!(recorder.results_for(1).iter().all(|r| r.status_code() == 503 && !r.is_up()));
}

#[tokio::test(start_paused = true)]
async fn test_worker_pool_bounds_concurrency() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.delay(&address(1), Duration::from_secs(3));
    checker.delay(&address(2), Duration::from_secs(3));
    let registry = MemoryRegistry::with(vec![target(1, 100), target(2, 100)]);
    let recorder = Arc::new(MemoryRecorder::default());
    let config = SchedulerConfig { max_concurrent_checks: 1, ..SchedulerConfig::default() };

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, config).start();
    sleep(Duration::from_millis(7_500)).await;
    handle.shutdown().await.unwrap();

    let mut offsets = checker.offsets(&address(1), start);
    offsets.extend(checker.offsets(&address(2), start));
    offsets.sort_unstable();
    assert_eq!(offsets, vec![0, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_prompt_and_final() {
    let checker = Arc::new(ScriptedChecker::default());
    let registry = MemoryRegistry::with(vec![target(1, 1)]);
    let recorder = Arc::new(MemoryRecorder::default());
    let config = SchedulerConfig { tick: Duration::from_secs(60), ..SchedulerConfig::default() };

    let start = Instant::now();
    let handle = scheduler(&checker, &registry, &recorder, config).start();
    sleep(Duration::from_millis(100)).await;

    handle.stop();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(handle.state(), SchedulerState::Stopped);
    assert!(start.elapsed() < Duration::from_secs(1));

    handle.shutdown().await.unwrap();
    assert_eq!(checker.offsets(&address(1), start), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_on_demand_check_records_and_returns() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.respond(&address(1), 404);
    let executor = executor(&checker);
    let recorder = MemoryRecorder::default();

    let result = run_check(&executor, &recorder, &target(1, 300)).await;

    assert!(!result.is_up());
    assert_eq!(result.status_code(), 404);
    assert_eq!(recorder.results_for(1), vec![result]);
}

#[tokio::test(start_paused = true)]
async fn test_on_demand_check_survives_recorder_failure() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.always(&address(1), Step::Fail(CheckError::Connect("connection refused".into())));
    let executor = executor(&checker);
    let recorder = MemoryRecorder::default();
    recorder.failing.store(true, Ordering::SeqCst);

    let result = run_check(&executor, &recorder, &target(1, 300)).await;

    assert_eq!(result.status_code(), 0);
    assert_eq!(result.error(), Some("connection failed: connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_check_and_record_reports_save_failure() {
    let checker = Arc::new(ScriptedChecker::default());
    checker.respond(&address(1), 200);
    let executor = executor(&checker);
    let recorder = MemoryRecorder::default();
    recorder.failing.store(true, Ordering::SeqCst);

    let (result, saved) = check_and_record(&executor, &recorder, &target(1, 300)).await;

    assert!(result.is_up());
    assert_eq!(saved.unwrap_err().to_string(), "disk I/O error");
    assert!(recorder.results_for(1).is_empty());

    recorder.failing.store(false, Ordering::SeqCst);
    let (result, saved) = check_and_record(&executor, &recorder, &target(1, 300)).await;
    assert!(saved.is_ok());
    assert_eq!(recorder.results_for(1), vec![result]);
}
