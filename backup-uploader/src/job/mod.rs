//! Backup job model and terminal outcomes.

pub mod tracker;

use crate::archive::CompressionResult;
use crate::transfer::attempt::{AttemptOutcome, TransferAttempt};
use crate::utils::errors::BackupError;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub use tracker::{JobClaim, JobTracker};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const ARCHIVE_EXTENSION: &str = "zip";
pub const TEMP_SUFFIX: &str = ".tmp";
const MAX_JOB_ID_LEN: usize = 128;

/// Lifecycle of a [`BackupJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Compressed,
    Uploading,
    Verified,
    Committed,
    Failed,
}

/// One backup run.
///
/// The local archive at `archive_path` exists only while `status` is
/// `Compressed`, `Uploading`, `Verified` or `Committed`.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub id: String,
    pub files: Vec<PathBuf>,
    pub archive_path: PathBuf,
    pub max_attempts: u32,
    pub verify: bool,
    pub status: JobStatus,
    pub compression: Option<CompressionResult>,
    pub attempts: Vec<TransferAttempt>,
}

impl BackupJob {
    /// Create a pending job whose archive will be built inside `work_dir`.
    pub fn new(id: impl Into<String>, files: Vec<PathBuf>, work_dir: &Path) -> Result<Self, BackupError> {
        let id = id.into();
        validate_job_id(&id)?;

        Ok(Self {
            archive_path: work_dir.join(archive_name(&id)),
            id,
            files,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            verify: true,
            status: JobStatus::Pending,
            compression: None,
            attempts: Vec::new(),
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, BackupError> {
        if max_attempts == 0 {
            return Err(BackupError::Config("max_attempts must be at least 1".to_string()));
        }
        self.max_attempts = max_attempts;
        Ok(self)
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Name of the archive, locally and once committed remotely.
    pub fn archive_name(&self) -> String {
        archive_name(&self.id)
    }

    /// Remote name used while the upload is in flight.
    pub fn temp_name(&self) -> String {
        format!("{}{}", self.archive_name(), TEMP_SUFFIX)
    }
}

pub fn archive_name(job_id: &str) -> String {
    format!("{}.{}", job_id, ARCHIVE_EXTENSION)
}

/// Default job identifier: local time as `YYYYMMDDHHMMSS`.
pub fn default_job_id() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Job ids become file and object names, so they are restricted to
/// `[A-Za-z0-9._-]` and may not start with a dot.
pub fn validate_job_id(id: &str) -> Result<(), BackupError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_JOB_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(BackupError::InvalidJobId(id.to_string()))
    }
}

/// Where the verified archive ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitLocation {
    /// Promoted to the final name
    Final,
    /// Rename failed; the verified bytes remain under the temporary name
    Temporary,
}

/// Caller-visible result of a backup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalOutcome {
    Committed { attempts: u32, location: CommitLocation },
    /// No input file could be archived
    CompressionFailed,
    /// The local archive could not be read back after creation
    ReadFailed,
    TransferExhausted { attempts: u32, last: AttemptOutcome },
    /// Cancellation observed between attempts
    Cancelled { attempts: u32 },
    /// Another run with the same job id is in progress
    Rejected { reason: String },
}

impl TerminalOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TerminalOutcome::Committed { .. })
    }
}
