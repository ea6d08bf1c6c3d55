use anyhow::Result;
use async_trait::async_trait;

use super::types::Target;

/// Read-only view of the sites that should currently be monitored.
///
/// The scheduler calls `list_all` once per tick, so additions and removals
/// made by other writers show up on the next tick.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Target>>;
}
