use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Row, params};
use std::time::SystemTime;
use tracing::debug;

use super::models::{CheckRecord, CheckRow, NewSite, Site, millis_to_timestamp, timestamp_to_millis};
use crate::monitoring::types::{CheckResult, Target};
use crate::monitoring::{ResultRecorder, TargetRegistry};
use crate::pool::{LibsqlManager, LibsqlPool};

const SITE_COLUMNS: &str = "id, url, frequency, alert_threshold, alert_email, created_at";
const CHECK_COLUMNS: &str = "id, site_id, timestamp, response_time_ms, is_up, status_code, error";

/// Database trait for the site and check-history operations used by the
/// command surface
#[async_trait]
pub trait Database: Send + Sync {
    /// Get all sites, oldest first
    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Get a site by id
    async fn get_site(&self, id: i64) -> Result<Option<Site>>;

    /// Insert a site and return the stored row
    async fn add_site(&self, site: &NewSite) -> Result<Site>;

    /// Delete a site and its whole history. Returns false if it did not exist.
    async fn delete_site(&self, id: i64) -> Result<bool>;

    /// Append a check to a site's history. Returns the new row id, or `None`
    /// when the site no longer exists.
    async fn save_check(&self, result: &CheckResult) -> Result<Option<i64>>;

    /// Most recent check of a site
    async fn latest_check(&self, site_id: i64) -> Result<Option<CheckRecord>>;

    /// Checks of a site since `since`, oldest first
    async fn history(&self, site_id: i64, since: SystemTime) -> Result<Vec<CheckRecord>>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow::anyhow!("Failed to get database connection: {}", e))
    }
}

fn site_from_row(row: &Row) -> Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        url: row.get(1)?,
        frequency: row.get(2)?,
        alert_threshold: row.get(3)?,
        alert_email: row.get(4)?,
        created_at: millis_to_timestamp(row.get(5)?),
    })
}

fn check_from_row(row: &Row) -> Result<CheckRecord> {
    Ok(CheckRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        timestamp: millis_to_timestamp(row.get(2)?),
        response_time_ms: row.get(3)?,
        is_up: row.get::<i64>(4)? != 0,
        status_code: u16::try_from(row.get::<i64>(5)?).unwrap_or(0),
        error: row.get(6)?,
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY id ASC"), ())
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(site_from_row(&row)?);
        }

        Ok(sites)
    }

    async fn get_site(&self, id: i64) -> Result<Option<Site>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(site_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn add_site(&self, site: &NewSite) -> Result<Site> {
        let conn = self.get_conn().await?;
        let created_at = SystemTime::now();

        conn.execute(
            "INSERT INTO sites (url, frequency, alert_threshold, alert_email, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                site.url.clone(),
                site.frequency as i64,
                i64::from(site.alert_threshold),
                site.alert_email.clone(),
                timestamp_to_millis(created_at)
            ],
        )
        .await
        .context("Failed to insert site")?;

        let id = conn.last_insert_rowid();
        debug!(site = id, url = %site.url, "Inserted site");

        Ok(Site {
            id,
            url: site.url.clone(),
            frequency: site.frequency as i64,
            alert_threshold: i64::from(site.alert_threshold),
            alert_email: site.alert_email.clone(),
            created_at: millis_to_timestamp(timestamp_to_millis(created_at)),
        })
    }

    async fn delete_site(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;

        // Foreign keys are not enforced on every connection, clear history explicitly
        let tx = conn.transaction().await?;
        let checks = tx.execute("DELETE FROM checks WHERE site_id = ?", params![id]).await?;
        let sites = tx.execute("DELETE FROM sites WHERE id = ?", params![id]).await?;
        tx.commit().await?;

        debug!(site = id, checks, "Deleted site");
        Ok(sites > 0)
    }

    async fn save_check(&self, result: &CheckResult) -> Result<Option<i64>> {
        let conn = self.get_conn().await?;
        let row = CheckRow::from(result);

        // Single insert guarded by the site's existence; no read-modify-write
        let inserted = conn
            .execute(
                "INSERT INTO checks (site_id, timestamp, response_time_ms, is_up, status_code, error)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6 WHERE EXISTS (SELECT 1 FROM sites WHERE id = ?1)",
                params![
                    row.site_id,
                    row.timestamp,
                    row.response_time_ms,
                    row.is_up,
                    row.status_code,
                    row.error
                ],
            )
            .await?;

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    async fn latest_check(&self, site_id: i64) -> Result<Option<CheckRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM checks WHERE site_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                params![site_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(check_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn history(&self, site_id: i64, since: SystemTime) -> Result<Vec<CheckRecord>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM checks WHERE site_id = ? AND timestamp >= ? ORDER BY timestamp ASC, id ASC"
                ),
                params![site_id, timestamp_to_millis(since)],
            )
            .await?;

        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }

        Ok(checks)
    }
}

#[async_trait]
impl TargetRegistry for DatabaseImpl {
    async fn list_all(&self) -> Result<Vec<Target>> {
        Ok(self.list_sites().await?.iter().map(Site::to_target).collect())
    }
}

#[async_trait]
impl ResultRecorder for DatabaseImpl {
    async fn save(&self, result: &CheckResult) -> Result<()> {
        if self.save_check(result).await?.is_none() {
            debug!(site = result.target_id(), "Site was removed before its check was saved");
        }
        Ok(())
    }
}
