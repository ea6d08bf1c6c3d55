use std::io;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;
mod config;
mod database;
mod monitoring;
mod pool;
mod validation;

use cli::{Cli, Command};
use commands::App;
use config::Config;
use database::DatabaseImpl;
use monitoring::MonitoringExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init_tracing_with_level(cli.log_level());

    let config = Config::from_config(cli.config.as_deref())?;
    debug!(database = %config.database.path, "Loaded configuration");

    // Not locked: scheduler tasks log to stdout from other threads
    let mut stdout = io::stdout();

    match cli.command {
        Command::Config => commands::show_config(&config, &mut stdout),
        Command::Run => open_app(config).await?.run().await,
        Command::Add { url, frequency, alert_threshold, alert_email } => open_app(config)
            .await?
            .add(&mut stdout, &url, frequency, alert_threshold, alert_email)
            .await
            .map(|_| ()),
        Command::Remove { id } => open_app(config).await?.remove(&mut stdout, id).await,
        Command::Check { id, json } => {
            open_app(config).await?.check(&mut stdout, id, json).await.map(|_| ())
        }
        Command::List { refresh } => open_app(config).await?.list(&mut stdout, refresh).await,
        Command::History { id, days, json } => {
            open_app(config).await?.history(&mut stdout, id, days, json).await
        }
    }
}

/// Open the database, bring its schema up to date and build the app
async fn open_app(config: Config) -> Result<App> {
    let pool = pool::open_pool(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    {
        let conn = pool.get().await.map_err(|e| anyhow!("Failed to get database connection: {}", e))?;
        database::initialize_database(&conn).await?;
    }

    let executor = Arc::new(MonitoringExecutor::new(&config.probe.to_http_options())?);
    Ok(App::new(config, Arc::new(DatabaseImpl::new_from_pool(pool)), executor))
}
