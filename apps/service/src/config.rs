use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::SchedulerConfig;
use crate::monitoring::checker::{DEFAULT_ACCEPT, DEFAULT_USER_AGENT, HttpOptions};
use crate::monitoring::ledger::DuePolicy;
use crate::validation::ValidationResult;

/// Shortest accepted scheduler tick
const MIN_TICK_MILLIS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("invalid config {path}: {reason}")]
    Invalid { path: path::PathBuf, reason: String },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSection,
    pub scheduler: SchedulerSection,
    pub probe: ProbeSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_millis: u64,
    pub max_concurrent_checks: usize,
    pub min_interval_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_failed_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub accept: String,
    pub max_redirects: usize,
    pub accept_invalid_certs: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { path: "uptime.db".into(), max_connections: 8 }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            max_concurrent_checks: 16,
            min_interval_seconds: 1,
            retry_failed_after_seconds: None,
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: DEFAULT_USER_AGENT.into(),
            accept: DEFAULT_ACCEPT.into(),
            max_redirects: 10,
            accept_invalid_certs: false,
        }
    }
}

impl DatabaseSection {
    pub fn validate(&self) -> ValidationResult {
        if self.path.trim().is_empty() {
            return ValidationResult::err("database.path cannot be empty");
        }
        if self.max_connections == 0 {
            return ValidationResult::err("database.max_connections must be at least 1");
        }
        ValidationResult::ok()
    }
}

impl SchedulerSection {
    /// Zero floors or ticks would let a site be probed on every cycle
    pub fn validate(&self) -> ValidationResult {
        if self.tick_millis < MIN_TICK_MILLIS {
            return ValidationResult::err(format!(
                "scheduler.tick_millis must be at least {MIN_TICK_MILLIS}"
            ));
        }
        if self.max_concurrent_checks == 0 {
            return ValidationResult::err("scheduler.max_concurrent_checks must be at least 1");
        }
        if self.min_interval_seconds == 0 {
            return ValidationResult::err("scheduler.min_interval_seconds must be at least 1");
        }
        if self.retry_failed_after_seconds == Some(0) {
            return ValidationResult::err("scheduler.retry_failed_after_seconds must be at least 1");
        }
        ValidationResult::ok()
    }

    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick: Duration::from_millis(self.tick_millis),
            max_concurrent_checks: self.max_concurrent_checks,
            due_policy: DuePolicy {
                min_interval: Duration::from_secs(self.min_interval_seconds),
                retry_failed_after: self.retry_failed_after_seconds.map(Duration::from_secs),
            },
        }
    }
}

impl ProbeSection {
    pub fn validate(&self) -> ValidationResult {
        if self.timeout_seconds == 0 {
            return ValidationResult::err("probe.timeout_seconds must be at least 1");
        }
        if self.user_agent.trim().is_empty() {
            return ValidationResult::err("probe.user_agent cannot be empty");
        }
        ValidationResult::ok()
    }

    pub fn to_http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.timeout_seconds),
            user_agent: self.user_agent.clone(),
            accept: self.accept.clone(),
            max_redirects: self.max_redirects,
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/sitewatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("sitewatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let retry = self
            .scheduler
            .retry_failed_after_seconds
            .map_or_else(|| "off".to_string(), |secs| format!("{secs}s"));

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Tick (ms)", &self.scheduler.tick_millis)?;
        write_1(f, "Max Concurrent Checks", &self.scheduler.max_concurrent_checks)?;
        write_1(f, "Min Interval (s)", &self.scheduler.min_interval_seconds)?;
        write_1(f, "Retry Failed After", &retry)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (s)", &self.probe.timeout_seconds)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_1(f, "Accept", &self.probe.accept)?;
        write_1(f, "Max Redirects", &self.probe.max_redirects)?;
        write_1(f, "Accept Invalid Certs", &self.probe.accept_invalid_certs)?;

        Ok(())
    }
}

impl Config {
    /// First failing section check, or ok
    pub fn validate(&self) -> ValidationResult {
        [self.database.validate(), self.scheduler.validate(), self.probe.validate()]
            .into_iter()
            .find(|check| !check.is_valid)
            .unwrap_or_else(ValidationResult::ok)
    }

    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/sitewatch/config.toml
    ///  or the specified path if one does not exist. Missing keys take
    ///  their default values. Out-of-range values are rejected.
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            let config: Self = toml::from_str(raw_string.as_str()).map_err(|source| {
                ConfigError::ParseFailed { path: config_path.clone(), source }
            })?;

            let check = config.validate();
            if !check.is_valid {
                return Err(ConfigError::Invalid {
                    path: config_path,
                    reason: check.error.unwrap_or_default(),
                });
            }
            Ok(config)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }
}
