//! Backup Uploader - Main entry point
//!
//! Runs one backup job and exits with a code describing its outcome.

use anyhow::Context;
use backup_uploader::{
    config::Config, exit, run_backup, shutdown::ShutdownCoordinator, utils, BackupError, BackupReport,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backup identifier (default: YYYYMMDDHHMMSS)
    #[arg(long)]
    id: Option<String>,

    /// Remote directory locator, e.g. file:///mnt/backups/
    #[arg(short, long, value_name = "URL")]
    remote: Option<String>,

    /// Maximum number of upload attempts
    #[arg(short = 'n', long)]
    max_attempts: Option<u32>,

    /// Commit without comparing remote and local fingerprints
    #[arg(long)]
    no_verify: bool,

    /// Directory for the job log file
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Write the final report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Files or directories to back up, added to the configured list
    files: Vec<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config, BackupError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env();

    if let Some(id) = &args.id {
        config.job.id = Some(id.clone());
    }
    if let Some(url) = &args.remote {
        config.remote.url = url.clone();
    }
    if let Some(max_attempts) = args.max_attempts {
        config.job.max_attempts = max_attempts;
    }
    if args.no_verify {
        config.job.verify = false;
    }
    if let Some(dir) = &args.log_dir {
        config.log.dir = Some(dir.clone());
    }
    config.job.files.extend(args.files.iter().cloned());

    Ok(config)
}

fn write_report(path: &Path, report: &BackupReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("backup-uploader: {}", e);
            return ExitCode::from(exit::error_code(&e));
        }
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    if let Err(e) = utils::logger::init(log_level) {
        eprintln!("backup-uploader: cannot initialize logging: {}", e);
        return ExitCode::from(exit::EXIT_LOG);
    }

    tracing::info!("Starting backup-uploader v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = ShutdownCoordinator::new();
    let token = shutdown.token();
    let signal_handle = tokio::spawn(async move {
        shutdown.wait_for_signal().await;
    });

    let code = match run_backup(&config, token).await {
        Ok(report) => {
            if let Some(path) = &args.report {
                if let Err(e) = write_report(path, &report) {
                    tracing::error!("Failed to write report: {:#}", e);
                }
            }
            exit::outcome_code(&report.outcome)
        }
        Err(e) => {
            tracing::error!("Backup could not start: {}", e);
            exit::error_code(&e)
        }
    };

    signal_handle.abort();
    ExitCode::from(code)
}
