use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Stable identifier of a monitored site
pub type TargetId = i64;

/// Default check interval for a site (5 minutes)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Default number of consecutive failures before alerting
pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

/// A monitored endpoint as seen by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,

    /// URL probed with a GET request
    pub address: String,

    /// Time between two checks. Zero is tolerated here and clamped by the
    /// scheduler.
    pub interval: Duration,

    /// Passed through for alerting, never evaluated by the monitor
    pub alert_threshold: u32,

    /// Passed through for alerting, never evaluated by the monitor
    pub alert_destination: Option<String>,
}

impl Target {
    pub fn new(id: TargetId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            interval: DEFAULT_INTERVAL,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            alert_destination: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Interval actually used for scheduling, never below `floor`
    pub fn effective_interval(&self, floor: Duration) -> Duration {
        self.interval.max(floor)
    }
}

/// Outcome of a single probe.
///
/// Built once per probe attempt through [`CheckResult::responded`] or
/// [`CheckResult::failed`] and read-only afterwards. `timestamp` is the
/// wall-clock time the probe was dispatched, not when it completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    target_id: TargetId,
    timestamp: SystemTime,
    up: bool,
    latency: Duration,
    status_code: u16,
    error: Option<String>,
}

impl CheckResult {
    /// A response was received; `up` is derived from the status code
    pub fn responded(
        target_id: TargetId,
        timestamp: SystemTime,
        latency: Duration,
        status_code: u16,
    ) -> Self {
        Self {
            target_id,
            timestamp,
            up: status_code < 400,
            latency,
            status_code,
            error: None,
        }
    }

    /// No response was obtained. Status code is 0.
    pub fn failed(
        target_id: TargetId,
        timestamp: SystemTime,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            target_id,
            timestamp,
            up: false,
            latency,
            status_code: 0,
            error: Some(error.into()),
        }
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// HTTP status, 0 when no response was received
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.up { "UP" } else { "DOWN" };
        write!(
            f,
            "site {} {} in {:.2}s (status {})",
            self.target_id,
            state,
            self.latency.as_secs_f64(),
            self.status_code
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}
