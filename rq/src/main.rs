//! requeue - request admission scheduler
//!
//! CLI entry point for running request batches.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use requeue::batch::{AttemptReport, AttemptSink, Batch};
use requeue::cli::{Cli, Command, OutputFormat, log_dir};
use requeue::config::Config;
use requeue::runtime::SchedulerHandle;
use requeue::scheduler::SchedulerStats;
use requeue::transport::{HttpTransport, Outcome, TransportError};

fn parse_level(level: &str) -> tracing::Level {
    match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", level);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = cli_log_level
        .or(config_log_level)
        .map(parse_level)
        .unwrap_or(tracing::Level::INFO);

    let log_file = fs::File::create(log_dir.join("requeue.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(scheduler = ?config.scheduler, "requeue loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            file,
            base_url,
            max_async,
            format,
        } => cmd_run(config, &file, base_url, max_async, format).await,
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_run(
    mut config: Config,
    file: &Path,
    base_url: Option<String>,
    max_async: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    debug!(file = %file.display(), ?base_url, ?max_async, ?format, "cmd_run: called");
    if base_url.is_some() {
        config.http.base_url = base_url;
    }
    if max_async.is_some() {
        config.scheduler.max_async = max_async;
    }

    let batch = Batch::load(file)?;
    let transport = HttpTransport::from_config(&config.http).context("Failed to build HTTP client")?;
    let handle = SchedulerHandle::spawn(config.scheduler.clone(), Arc::new(transport), &config.runtime);

    let sink: AttemptSink = match format {
        OutputFormat::Text => Arc::new(print_attempt),
        OutputFormat::Json => Arc::new(|_: AttemptReport| {}),
    };

    info!(file = %file.display(), requests = batch.request_count(), "Running batch");
    let stats = batch.run(&handle, sink).await.context("Batch run failed")?;
    handle.shutdown().await.ok();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print_summary(&stats),
    }
    Ok(())
}

fn print_attempt(report: AttemptReport) {
    let thread = report.thread.as_deref().unwrap_or("-");
    let target = format!("{} {}", report.method, report.url);
    match &report.outcome {
        Outcome::Completed(response) if response.is_success() => {
            println!("{} {} {} [{}]", "✓".green(), response.status.to_string().green(), target, thread.cyan());
        }
        Outcome::Completed(response) => {
            println!("{} {} {} [{}]", "✗".red(), response.status.to_string().red(), target, thread.cyan());
        }
        Outcome::Failed(err @ TransportError::Timeout(_)) => {
            println!("{} {} {} [{}]", "⏱".yellow(), err.to_string().yellow(), target, thread.cyan());
        }
        Outcome::Failed(err) => {
            println!("{} {} {} [{}]", "✗".red(), err.to_string().red(), target, thread.cyan());
        }
    }
}

fn print_summary(stats: &SchedulerStats) {
    println!();
    println!("{}", "Summary".bold());
    println!("  dispatched: {}", stats.total_dispatched);
    println!("  settled:    {}", stats.total_settled);
    println!("  failed:     {}", stats.total_failed.to_string().red());
    println!("  retried:    {}", stats.total_retried.to_string().yellow());
    println!("  dropped:    {}", stats.total_dropped.to_string().dimmed());
    println!("  peak:       {}", stats.peak_concurrent);
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}
