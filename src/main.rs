use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use gcal_feeds::storage::config::Config;
use gcal_feeds::ui::TracingNotifier;
use gcal_feeds::SyncEngine;

mod auth;
use auth::{StdinCodeSource, check_credentials};
mod cli;
use cli::{CliMode, USAGE, parse_cli_mode};

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let mode = match parse_cli_mode() {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("Error: {}", err);
            println!("{}", USAGE);
            return Ok(());
        }
    };

    if mode == CliMode::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load_or_create()?;

    if let Err(e) = check_credentials(&config) {
        eprintln!("Authentication error: {}", e);
        tracing::error!("Authentication failed: {}", e);
        return Ok(());
    }

    let engine = SyncEngine::from_config(
        &config,
        Arc::new(StdinCodeSource),
        Arc::new(TracingNotifier),
    )?;

    if let Err(e) = cli::run(&engine, mode).await {
        eprintln!("Error: {}", e);
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging() {
    let log_dir = Config::config_dir();

    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "gcal-feeds.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    std::mem::forget(_guard);

    tracing::info!("gcal-feeds started");
}
