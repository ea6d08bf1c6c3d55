use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Config;
use crate::database::{CheckRecord, Database, DatabaseImpl, HistorySeries, NewSite, Site, is_stale};
use crate::monitoring::{
    CheckResult, MonitoringExecutor, MonitoringScheduler, TargetId, check_and_record,
};
use crate::validation::{
    normalize_site_url, validate_alert_email, validate_alert_threshold, validate_frequency,
    validate_http_endpoint,
};

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Shared state for the command surface
pub struct App {
    pub config: Config,
    pub db: Arc<DatabaseImpl>,
    pub executor: Arc<MonitoringExecutor>,
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_check(check: &CheckRecord) -> String {
    let status = if check.is_up { "UP" } else { "DOWN" };
    let mut line = format!(
        "{status:<4} {:>3} {:>7.2}s  {}",
        check.status_code,
        check.response_time().as_secs_f64(),
        format_time(check.timestamp)
    );
    if let Some(error) = &check.error {
        line.push_str(&format!("  {error}"));
    }
    line
}

fn result_json(site: &Site, result: &CheckResult) -> serde_json::Value {
    let timestamp: DateTime<Utc> = result.timestamp().into();
    serde_json::json!({
        "site_id": site.id,
        "url": site.url,
        "timestamp": timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "is_up": result.is_up(),
        "status_code": result.status_code(),
        "response_time": result.latency().as_secs_f64(),
        "error": result.error(),
    })
}

impl App {
    pub fn new(config: Config, db: Arc<DatabaseImpl>, executor: Arc<MonitoringExecutor>) -> Self {
        Self { config, db, executor }
    }

    async fn require_site(&self, id: TargetId) -> Result<Site> {
        self.db.get_site(id).await?.with_context(|| format!("No site with id {id}"))
    }

    /// Probe a site now and record the outcome. The result comes back even
    /// when recording failed.
    async fn check_now(&self, site: &Site) -> (CheckResult, Result<()>) {
        let (result, saved) = check_and_record(&self.executor, self.db.as_ref(), &site.to_target()).await;
        (result, saved.context("Check result was not recorded"))
    }

    /// Run the scheduler until Ctrl-C, then wait for in-flight checks
    pub async fn run(&self) -> Result<()> {
        let scheduler = MonitoringScheduler::new(
            self.executor.clone(),
            self.db.clone(),
            self.db.clone(),
            self.config.scheduler.to_scheduler_config(),
        );
        let handle = scheduler.start();

        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
        info!("Ctrl-C received, stopping monitoring scheduler");

        handle.shutdown().await
    }

    pub async fn add(
        &self,
        out: &mut impl Write,
        url: &str,
        frequency: u64,
        alert_threshold: u32,
        alert_email: Option<String>,
    ) -> Result<Site> {
        let url = normalize_site_url(url);
        validate_http_endpoint(&url).to_result()?;
        validate_frequency(frequency).to_result()?;
        validate_alert_threshold(alert_threshold).to_result()?;
        if let Some(email) = &alert_email {
            validate_alert_email(email).to_result()?;
        }

        let site = self
            .db
            .add_site(&NewSite { url, frequency, alert_threshold, alert_email })
            .await?;
        info!(site = site.id, url = %site.url, "Added site");
        writeln!(out, "Added site {} ({}), checking every {}s", site.id, site.url, site.frequency)?;

        let (result, saved) = self.check_now(&site).await;
        writeln!(out, "Initial check: {result}")?;
        saved?;

        Ok(site)
    }

    pub async fn remove(&self, out: &mut impl Write, id: TargetId) -> Result<()> {
        if !self.db.delete_site(id).await? {
            bail!("No site with id {id}");
        }
        info!(site = id, "Removed site");
        writeln!(out, "Removed site {id}")?;
        Ok(())
    }

    pub async fn check(&self, out: &mut impl Write, id: TargetId, json: bool) -> Result<CheckResult> {
        let site = self.require_site(id).await?;
        let (result, saved) = self.check_now(&site).await;

        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&result_json(&site, &result))?)?;
        } else {
            writeln!(out, "{} {result}", site.url)?;
        }
        saved?;

        Ok(result)
    }

    /// List every site with its latest check. With `refresh`, stale sites
    /// are checked first.
    pub async fn list(&self, out: &mut impl Write, refresh: bool) -> Result<()> {
        let sites = self.db.list_sites().await?;
        if sites.is_empty() {
            writeln!(out, "No sites are being monitored")?;
            return Ok(());
        }

        for site in &sites {
            let mut latest = self.db.latest_check(site.id).await?;

            if refresh && is_stale(site, latest.as_ref(), SystemTime::now()) {
                self.check_now(site).await.1?;
                latest = self.db.latest_check(site.id).await?;
            }

            let summary = latest.as_ref().map_or_else(|| "never checked".to_string(), format_check);
            writeln!(out, "{:>4}  {:<40} every {:>5}s  {summary}", site.id, site.url, site.frequency)?;
        }

        Ok(())
    }

    pub async fn history(&self, out: &mut impl Write, id: TargetId, days: u64, json: bool) -> Result<()> {
        let site = self.require_site(id).await?;
        let window = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
        let since = SystemTime::now().checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        let checks = self.db.history(site.id, since).await?;

        if json {
            let series = HistorySeries::from(checks.as_slice());
            writeln!(out, "{}", serde_json::to_string(&series)?)?;
            return Ok(());
        }

        writeln!(out, "{} ({} checks in the last {days} days)", site.url, checks.len())?;
        for check in &checks {
            writeln!(out, "  {}", format_check(check))?;
        }

        Ok(())
    }
}

pub fn show_config(config: &Config, out: &mut impl Write) -> Result<()> {
    write!(out, "{config}")?;
    Ok(())
}
