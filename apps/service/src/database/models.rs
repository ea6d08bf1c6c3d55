use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::monitoring::types::{CheckResult, DEFAULT_ALERT_THRESHOLD, DEFAULT_INTERVAL, Target};

/// Convert SystemTime to Unix milliseconds
pub fn timestamp_to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Convert Unix milliseconds to SystemTime
pub fn millis_to_timestamp(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

/// Site model - a row of the `sites` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub id: i64,
    pub url: String,
    /// Seconds between checks as stored. May be zero or negative in a
    /// hand-edited database; the scheduler clamps it.
    pub frequency: i64,
    pub alert_threshold: i64,
    pub alert_email: Option<String>,
    pub created_at: SystemTime,
}

impl Site {
    /// Scheduler view of this site
    pub fn to_target(&self) -> Target {
        Target {
            id: self.id,
            address: self.url.clone(),
            interval: Duration::from_secs(self.frequency.max(0) as u64),
            alert_threshold: u32::try_from(self.alert_threshold).unwrap_or(DEFAULT_ALERT_THRESHOLD),
            alert_destination: self.alert_email.clone(),
        }
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency.max(0) as u64)
    }
}

/// Input for creating a site. Validation happens in the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSite {
    pub url: String,
    pub frequency: u64,
    pub alert_threshold: u32,
    pub alert_email: Option<String>,
}

impl NewSite {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            frequency: DEFAULT_INTERVAL.as_secs(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            alert_email: None,
        }
    }
}

/// CheckRecord model - a persisted probe outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRecord {
    pub id: i64,
    pub site_id: i64,
    pub timestamp: SystemTime,
    pub response_time_ms: i64,
    pub is_up: bool,
    pub status_code: u16,
    pub error: Option<String>,
}

impl CheckRecord {
    pub fn response_time(&self) -> Duration {
        Duration::from_millis(self.response_time_ms.max(0) as u64)
    }

    /// Whether this check is older than `frequency` at `now`
    pub fn is_older_than(&self, frequency: Duration, now: SystemTime) -> bool {
        now.duration_since(self.timestamp).unwrap_or_default() > frequency
    }
}

/// Row values for inserting a [`CheckResult`]
pub(crate) struct CheckRow {
    pub site_id: i64,
    pub timestamp: i64,
    pub response_time_ms: i64,
    pub is_up: i64,
    pub status_code: i64,
    pub error: Option<String>,
}

impl From<&CheckResult> for CheckRow {
    fn from(result: &CheckResult) -> Self {
        Self {
            site_id: result.target_id(),
            timestamp: timestamp_to_millis(result.timestamp()),
            response_time_ms: result.latency().as_millis() as i64,
            is_up: i64::from(result.is_up()),
            status_code: i64::from(result.status_code()),
            error: result.error().map(str::to_string),
        }
    }
}

/// Dashboard staleness rule: a site needs a fresh check when it has none or
/// its latest one is older than its frequency.
pub fn is_stale(site: &Site, latest: Option<&CheckRecord>, now: SystemTime) -> bool {
    latest.is_none_or(|check| check.is_older_than(site.frequency(), now))
}

/// Check history in the column-wise shape charting code expects
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySeries {
    /// RFC 3339 timestamps, oldest first
    pub times: Vec<String>,
    /// Seconds
    pub response_times: Vec<f64>,
    pub up_status: Vec<bool>,
}

impl From<&[CheckRecord]> for HistorySeries {
    fn from(checks: &[CheckRecord]) -> Self {
        let mut series = HistorySeries::default();
        for check in checks {
            let time: chrono::DateTime<chrono::Utc> = check.timestamp.into();
            series.times.push(time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
            series.response_times.push(check.response_time().as_secs_f64());
            series.up_status.push(check.is_up);
        }
        series
    }
}
