//! One complete backup run, from configuration to released environment.

use crate::accounting::Counters;
use crate::archive::CompressionResult;
use crate::config::Config;
use crate::environment::BackupEnvironment;
use crate::fs::collect_files;
use crate::job::{default_job_id, validate_job_id, BackupJob, JobStatus, JobTracker, TerminalOutcome};
use crate::remote::{open_store, RemoteLocator, RemoteStore};
use crate::transfer::{TransferAttempt, TransferEngine};
use crate::utils::errors::BackupError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Summary of a finished run.
#[derive(Debug, Serialize)]
pub struct BackupReport {
    pub job_id: String,
    pub remote: String,
    pub outcome: TerminalOutcome,
    pub status: JobStatus,
    pub compression: Option<CompressionResult>,
    pub attempts: Vec<TransferAttempt>,
    pub counters: Counters,
    /// Job log, when it was kept outside the temporary directory
    pub log_path: Option<PathBuf>,
    pub duration_ms: u64,
}

/// Run one backup described by `config`.
///
/// Errors are setup failures (configuration, a job id already in use,
/// temporary directory, log file, unreachable local remote directory).
/// Everything after the job starts is reported through
/// [`BackupReport::outcome`].
pub async fn run_backup(config: &Config, cancel: CancellationToken) -> Result<BackupReport, BackupError> {
    let started = Instant::now();
    config.validate()?;

    let job_id = config.job.id.clone().unwrap_or_else(default_job_id);
    validate_job_id(&job_id)?;

    // Held until the environment is released; nothing on disk is touched before
    let claim = JobTracker::global()
        .claim(&job_id)
        .ok_or_else(|| BackupError::JobInUse(job_id.clone()))?;

    let locator = RemoteLocator::parse(&config.remote.url)?;
    let store: Arc<dyn RemoteStore> = Arc::from(open_store(&locator, config.operation_timeout())?);

    let inputs = config.job.files.clone();
    let options = config.collect_options();
    let files = tokio::task::spawn_blocking(move || collect_files(&inputs, &options))
        .await
        .map_err(|e| BackupError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    let (env, mut acc) = BackupEnvironment::open(&job_id, config.log.dir.as_deref())?;
    acc.note(crate::accounting::Level::Info, format!("Setup of {} files to backup.", files.len()));

    let mut job = BackupJob::new(job_id.clone(), files, env.temp_dir())?
        .with_max_attempts(config.job.max_attempts)?
        .with_verify(config.job.verify);

    let engine = TransferEngine::new(store)
        .with_archive_options(config.archive_options())
        .with_timeout(config.operation_timeout())
        .with_cancel(cancel);

    let outcome = engine.run_claimed(&claim, &mut job, &mut acc).await;
    acc.close();

    let report = BackupReport {
        job_id,
        remote: locator.to_string(),
        outcome,
        status: job.status,
        compression: job.compression.take(),
        attempts: std::mem::take(&mut job.attempts),
        counters: acc.counters(),
        log_path: config.log.dir.as_ref().map(|_| env.log_path().to_path_buf()),
        duration_ms: started.elapsed().as_millis() as u64,
    };

    if let Err(e) = env.release() {
        tracing::warn!("Failed to remove temporary directory: {}", e);
    }
    drop(claim);

    Ok(report)
}
