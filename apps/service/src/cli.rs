use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::monitoring::TargetId;
use crate::monitoring::types::{DEFAULT_ALERT_THRESHOLD, DEFAULT_INTERVAL};

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-site HTTP uptime monitor", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SITEWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the background scheduler until Ctrl-C
    Run,
    /// Start monitoring a site and check it once
    Add {
        /// Site address; `https://` is assumed when no scheme is given
        url: String,
        /// Seconds between checks
        #[arg(short, long, default_value_t = DEFAULT_INTERVAL.as_secs())]
        frequency: u64,
        /// Consecutive failures before alerting
        #[arg(long, default_value_t = DEFAULT_ALERT_THRESHOLD)]
        alert_threshold: u32,
        #[arg(long)]
        alert_email: Option<String>,
    },
    /// Stop monitoring a site and delete its history
    Remove { id: TargetId },
    /// Check a site now and record the result
    Check {
        id: TargetId,
        #[arg(long)]
        json: bool,
    },
    /// List sites with their latest check
    List {
        /// Re-check sites whose latest check is older than their frequency
        #[arg(long)]
        refresh: bool,
    },
    /// Show a site's check history
    History {
        id: TargetId,
        #[arg(short, long, default_value_t = 7)]
        days: u64,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}
