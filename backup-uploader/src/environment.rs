//! Per-job working environment: a private temporary directory and the job
//! log file.
//!
//! The directory is removed by [`BackupEnvironment::release`] or, on any
//! other exit path, when the handle is dropped.

use crate::accounting::Accounting;
use crate::utils::errors::BackupError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct BackupEnvironment {
    job_id: String,
    temp_dir: TempDir,
    log_path: PathBuf,
}

impl BackupEnvironment {
    /// Create the temporary directory for `job_id` and open its log file in
    /// `log_dir` (the temporary directory itself when `None`).
    pub fn open(job_id: &str, log_dir: Option<&Path>) -> Result<(Self, Accounting), BackupError> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir()
            .map_err(BackupError::TempDir)?;
        tracing::info!("The temporary directory is {}", temp_dir.path().display());

        let log_path = log_dir
            .unwrap_or_else(|| temp_dir.path())
            .join(format!("{}.log", job_id));
        // Appended to, so a log kept across runs of the same id only grows
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(BackupError::Log)?;
        tracing::info!("Log file created in {}", log_path.display());

        let mut accounting = Accounting::with_log_file(job_id, log_file);
        accounting.info("Backup started.");
        accounting.info(format!("The backup identifier is {}", job_id));
        accounting.info(format!("The temporary directory is {}", temp_dir.path().display()));
        accounting.info(format!("The log file is {}", log_path.display()));

        Ok((
            Self {
                job_id: job_id.to_string(),
                temp_dir,
                log_path,
            },
            accounting,
        ))
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Delete the temporary directory and everything in it.
    pub fn release(self) -> Result<(), BackupError> {
        let path = self.temp_dir.path().to_path_buf();
        self.temp_dir.close().map_err(BackupError::TempDir)?;
        tracing::debug!("Removed temporary directory {}", path.display());
        Ok(())
    }
}
