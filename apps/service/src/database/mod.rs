/// Database layer
///
/// Sites and their check history live in a local LibSQL (SQLite) file.
/// The repository also serves as the scheduler's target registry and
/// result recorder.
pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{CheckRecord, HistorySeries, NewSite, Site, is_stale};
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
