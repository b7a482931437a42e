//! Custom error types for the backup uploader.
//!
//! These cover setup and adapter failures. The outcome of a backup run itself
//! is a [`crate::job::TerminalOutcome`], not an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Temporary directory error: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("Log file error: {0}")]
    Log(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job already running: {0}")]
    JobInUse(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
