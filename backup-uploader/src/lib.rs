//! Backup Uploader Library
//!
//! Packs local files into a zip archive and transfers it to a remote store
//! under a temporary name, verifies the remote copy by fingerprint and only
//! then commits it under its final name.

pub mod accounting;
pub mod archive;
pub mod config;
pub mod environment;
pub mod exit;
pub mod fingerprint;
pub mod fs;
pub mod job;
pub mod remote;
pub mod runner;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use job::{BackupJob, TerminalOutcome};
pub use runner::{run_backup, BackupReport};
pub use transfer::TransferEngine;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
