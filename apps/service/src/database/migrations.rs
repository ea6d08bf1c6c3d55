use anyhow::Result;
use libsql::Connection;

use super::models::timestamp_to_millis;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 3;

/// Run database migrations
///
/// Migrations are applied in order and recorded in `schema_migrations`, so
/// running this on an up-to-date database is a no-op.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial schema").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Index check history by site and time").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "Store timestamps in milliseconds").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
pub(crate) async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = timestamp_to_millis(std::time::SystemTime::now());

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: sites and their check history
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sites (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            frequency INTEGER NOT NULL DEFAULT 300,
            alert_threshold INTEGER NOT NULL DEFAULT 3,
            alert_email TEXT,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            site_id INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            is_up INTEGER NOT NULL,
            status_code INTEGER NOT NULL,
            error TEXT,
            FOREIGN KEY (site_id) REFERENCES sites(id) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: indexes for latest-check and history lookups
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute("CREATE INDEX IF NOT EXISTS idx_checks_site_id ON checks(site_id)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checks_site_timestamp ON checks(site_id, timestamp DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v3: second-resolution timestamps become milliseconds
async fn run_migration_v3(conn: &Connection) -> Result<()> {
    let tx = conn.transaction().await?;
    tx.execute("UPDATE checks SET timestamp = timestamp * 1000", ()).await?;
    tx.execute("UPDATE sites SET created_at = created_at * 1000", ()).await?;
    tx.commit().await?;

    Ok(())
}
