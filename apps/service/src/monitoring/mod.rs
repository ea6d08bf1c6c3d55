/// Monitoring engine module - probes sites and schedules the checks
///
/// This module is responsible for:
/// - Executing HTTP checks and classifying their outcome (`checker`, `executor`)
/// - Deciding when each site is due (`ledger`)
/// - Running the background tick loop (`scheduler`, `lifecycle`)
///
/// Storage is reached only through the `TargetRegistry` and `ResultRecorder`
/// traits.
pub mod checker;
pub mod executor;
pub mod ledger;
pub mod lifecycle;
pub mod recorder;
pub mod registry;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod tests;

pub use executor::MonitoringExecutor;
pub use lifecycle::{MonitorHandle, SchedulerState};
pub use recorder::{ResultRecorder, check_and_record, run_check};
pub use registry::TargetRegistry;
pub use scheduler::{MonitoringScheduler, SchedulerConfig};
pub use types::{CheckResult, Target, TargetId};
