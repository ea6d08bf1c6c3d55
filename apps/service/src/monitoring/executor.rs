use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

use super::checker::{CheckError, Checker, HttpChecker, HttpOptions};
use super::types::{CheckResult, Target};

/// Monitoring executor - runs one probe against a target and classifies it.
///
/// `execute_check` never fails: every transport problem, including a checker
/// that does not return within the timeout, becomes a down [`CheckResult`].
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    timeout: Duration,
}

impl MonitoringExecutor {
    /// Create an executor backed by the HTTP checker
    pub fn new(options: &HttpOptions) -> Result<Self> {
        Ok(Self::with_checker(Arc::new(HttpChecker::new(options)?), options.timeout))
    }

    /// Create an executor around any transport
    pub fn with_checker(checker: Arc<dyn Checker>, timeout: Duration) -> Self {
        Self { checker, timeout }
    }

    /// Probe `target` once
    pub async fn execute_check(&self, target: &Target) -> CheckResult {
        let timestamp = SystemTime::now();
        let start = Instant::now();

        info!(site = target.id, url = %target.address, "Starting check");

        let outcome = match timeout(self.timeout, self.checker.check(&target.address)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CheckError::Timeout),
        };
        let latency = start.elapsed();

        match outcome {
            Ok(status_code) => {
                info!(
                    site = target.id,
                    url = %target.address,
                    status_code,
                    latency_ms = latency.as_millis() as u64,
                    "Received response"
                );
                CheckResult::responded(target.id, timestamp, latency, status_code)
            }
            Err(e) => {
                warn!(
                    site = target.id,
                    url = %target.address,
                    latency_ms = latency.as_millis() as u64,
                    "Request failed: {}",
                    e
                );
                CheckResult::failed(target.id, timestamp, latency, e.to_string())
            }
        }
    }
}
