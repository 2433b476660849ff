//! dynwire - command line front end for node-hosted protocols

mod commands;
mod logging;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use commands::Commands;
use dynwire_client::transport::DEFAULT_ENDPOINT;
use dynwire_client::Dispatcher;
use tracing::{debug, error, Level};

#[derive(Parser)]
#[command(name = "dynwire")]
#[command(about = "Discover, inspect and call runtime-loaded node protocols")]
#[command(version)]
struct Cli {
    /// Control endpoint URL
    #[arg(short = 'e', long, global = true, env = "DYNWIRE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Exchange timeout in seconds
    #[arg(
        short = 't',
        long,
        global = true,
        env = "DYNWIRE_TIMEOUT_SECS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Set logging level (overridden by RUST_LOG)
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.into())?;

    let dispatcher = Dispatcher::builder()
        .endpoint(cli.endpoint.clone())
        .exchange_timeout(Duration::from_secs(cli.timeout))
        .build()
        .context("Failed to create dispatcher")?;
    debug!(endpoint = %cli.endpoint, timeout = cli.timeout, "dispatcher ready");

    if let Err(e) = cli.command.execute(&dispatcher).await {
        error!("Command failed: {e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
