//! Transfer engine - runs one backup job from file list to committed archive.
//!
//! The remote side only ever sees two names per job: the temporary name
//! (`{id}.zip.tmp`) that every attempt overwrites, and the final name
//! (`{id}.zip`) that is touched once, after the temporary object has been
//! verified. A reader of the final name therefore sees either the previous
//! backup or a verified new one.
//!
//! ```text
//! Idle -> Compressing -> Hashing -> Uploading(i) -> Verifying(i) -> Committed
//!                                       ^                |
//!                                       +-- RetryOrFail(i+1) --> Aborted
//! ```

use crate::accounting::{Accounting, Level};
use crate::archive::{ArchiveBuilder, ArchiveOptions, BuildError, CompressionResult};
use crate::fingerprint::{self, Fingerprint};
use crate::job::{BackupJob, CommitLocation, JobClaim, JobStatus, JobTracker, TerminalOutcome};
use crate::remote::{RemoteStore, StoreError, StoreResult};
use crate::transfer::attempt::{AttemptOutcome, TransferAttempt};
use crate::utils::format::{format_bytes, format_elapsed};
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Upper bound for every single remote operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    Compressing,
    Hashing,
    Uploading(u32),
    Verifying(u32),
    RetryOrFail(u32),
    Committed,
    Aborted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => f.write_str("idle"),
            EngineState::Compressing => f.write_str("compressing"),
            EngineState::Hashing => f.write_str("hashing"),
            EngineState::Uploading(n) => write!(f, "uploading(#{})", n),
            EngineState::Verifying(n) => write!(f, "verifying(#{})", n),
            EngineState::RetryOrFail(n) => write!(f, "retry-or-fail(#{})", n),
            EngineState::Committed => f.write_str("committed"),
            EngineState::Aborted => f.write_str("aborted"),
        }
    }
}

struct StateMachine<'a> {
    job_id: &'a str,
    state: EngineState,
}

impl<'a> StateMachine<'a> {
    fn new(job_id: &'a str) -> Self {
        Self {
            job_id,
            state: EngineState::Idle,
        }
    }

    fn advance(&mut self, next: EngineState) {
        tracing::debug!(job_id = %self.job_id, from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

pub struct TransferEngine {
    store: Arc<dyn RemoteStore>,
    archive: ArchiveOptions,
    op_timeout: Duration,
    cancel_token: CancellationToken,
    tracker: JobTracker,
}

impl TransferEngine {
    /// Create an engine for `store` (no cancellation support)
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            archive: ArchiveOptions::default(),
            op_timeout: DEFAULT_OPERATION_TIMEOUT,
            cancel_token: CancellationToken::new(),
            tracker: JobTracker::global().clone(),
        }
    }

    pub fn with_archive_options(mut self, archive: ArchiveOptions) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Cancellation is honoured between attempts only.
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_tracker(mut self, tracker: JobTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Run `job` to a terminal outcome.
    ///
    /// The job id is claimed from the engine's tracker for the duration of
    /// the run. The error/warning summary is recorded on every path, aborts
    /// included.
    pub async fn run(&self, job: &mut BackupJob, acc: &mut Accounting) -> TerminalOutcome {
        match self.tracker.claim(&job.id) {
            Some(claim) => self.run_claimed(&claim, job, acc).await,
            None => {
                let reason = format!("job {} is already running", job.id);
                let outcome = reject(job, acc, reason);
                summarize(acc);
                outcome
            }
        }
    }

    /// Like [`run`](Self::run), under a claim the caller already holds.
    pub async fn run_claimed(&self, claim: &JobClaim, job: &mut BackupJob, acc: &mut Accounting) -> TerminalOutcome {
        let outcome = if claim.job_id() == job.id {
            self.execute(job, acc).await
        } else {
            let reason = format!("claim is for job {}, not {}", claim.job_id(), job.id);
            reject(job, acc, reason)
        };
        summarize(acc);
        outcome
    }

    async fn execute(&self, job: &mut BackupJob, acc: &mut Accounting) -> TerminalOutcome {
        let started = Instant::now();
        let job_id = job.id.clone();
        let mut machine = StateMachine::new(&job_id);

        acc.info(format!(
            "Start backup id {} for {} files into {}",
            job.id,
            job.files.len(),
            self.store.describe()
        ));
        acc.info("The files included into backup are:");
        for file in &job.files {
            acc.info(file.display().to_string());
        }

        // Compress
        machine.advance(EngineState::Compressing);
        let compression = self.compress(job).await;
        let compressed = match compression {
            Ok(result) => {
                log_compression(&result, acc);
                job.compression = Some(result);
                true
            }
            Err(BuildError::NothingArchived(result)) => {
                log_compression(&result, acc);
                acc.warn("No success on compression. Aborting...");
                job.compression = Some(result);
                false
            }
            Err(e) => {
                acc.error(format!("Compression failed: {}", e));
                false
            }
        };
        if !compressed {
            machine.advance(EngineState::Aborted);
            fail(job).await;
            return TerminalOutcome::CompressionFailed;
        }
        job.status = JobStatus::Compressed;

        // Hash
        machine.advance(EngineState::Hashing);
        let (data, local_digest) = match load_archive(&job.archive_path).await {
            Ok(loaded) => loaded,
            Err(e) => {
                acc.error(format!("Fail to get data from compressed file: {}. Aborting.", e));
                machine.advance(EngineState::Aborted);
                fail(job).await;
                return TerminalOutcome::ReadFailed;
            }
        };
        acc.note(Level::Info, format!("Read {} from compressed file.", format_bytes(data.len() as u64)));
        acc.info(format!("{} is the fingerprint of the compressed file", local_digest));

        // Upload loop
        let final_name = job.archive_name();
        let temp_name = job.temp_name();
        job.status = JobStatus::Uploading;

        for attempt in 1..=job.max_attempts {
            if self.cancel_token.is_cancelled() {
                acc.warn(format!("Backup cancelled before attempt #{}.", attempt));
                machine.advance(EngineState::Aborted);
                fail(job).await;
                return TerminalOutcome::Cancelled {
                    attempts: job.attempts.len() as u32,
                };
            }

            machine.advance(EngineState::Uploading(attempt));
            let record = self
                .attempt(attempt, job.verify, &temp_name, &data, local_digest, &mut machine, acc)
                .await;
            let succeeded = record.outcome == AttemptOutcome::Success;
            job.attempts.push(record);

            if !succeeded {
                machine.advance(EngineState::RetryOrFail(attempt.saturating_add(1)));
                continue;
            }

            if job.verify {
                job.status = JobStatus::Verified;
            }
            acc.info(format!("Success of backup on attempt #{}.", attempt));

            let location = self.commit(&temp_name, &final_name, acc).await;
            machine.advance(EngineState::Committed);
            job.status = JobStatus::Committed;
            acc.info(format!(
                "{} committed in {}.",
                final_name,
                format_elapsed(started.elapsed())
            ));

            return TerminalOutcome::Committed {
                attempts: attempt,
                location,
            };
        }

        let last = job
            .attempts
            .last()
            .map(|a| a.outcome)
            .unwrap_or(AttemptOutcome::WriteFailed);
        acc.error(format!(
            "Transfer failed after {} attempts (last: {}). {} is left on the remote for inspection.",
            job.max_attempts, last, temp_name
        ));
        machine.advance(EngineState::Aborted);
        fail(job).await;

        TerminalOutcome::TransferExhausted {
            attempts: job.max_attempts,
            last,
        }
    }

    async fn compress(&self, job: &BackupJob) -> Result<CompressionResult, BuildError> {
        let builder = ArchiveBuilder::new(self.archive.clone());
        let files = job.files.clone();
        let destination = job.archive_path.clone();

        // Zip construction is blocking I/O
        match tokio::task::spawn_blocking(move || builder.build(&files, &destination)).await {
            Ok(result) => result,
            Err(e) => Err(BuildError::Create {
                path: job.archive_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            }),
        }
    }

    /// One write (+ verify) cycle against the temporary name.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        attempt: u32,
        verify: bool,
        temp_name: &str,
        data: &Bytes,
        local_digest: Fingerprint,
        machine: &mut StateMachine<'_>,
        acc: &mut Accounting,
    ) -> TransferAttempt {
        acc.note(
            Level::Info,
            format!("Attempt #{} to send {} to {}.", attempt, temp_name, self.store.describe()),
        );

        // A stale temporary object from an earlier run must not block the write
        let written = self
            .bounded(self.store.write(temp_name, data.clone(), true))
            .await;
        let bytes_written = match written {
            Ok(0) => {
                acc.error(format!("Remote write reported zero bytes on attempt #{}.", attempt));
                0
            }
            Ok(n) => {
                acc.note(Level::Info, format!("Wrote {} bytes into remote file.", n));
                n
            }
            Err(e) => {
                acc.error(format!(
                    "Fail to write data into remote file on attempt #{}: {}",
                    attempt, e
                ));
                0
            }
        };

        if bytes_written == 0 {
            let outcome = if verify {
                acc.note(
                    Level::Info,
                    format!("Skipping verification because the write failed on attempt #{}.", attempt),
                );
                AttemptOutcome::VerifySkippedBecauseWriteFailed
            } else {
                AttemptOutcome::WriteFailed
            };
            return TransferAttempt {
                attempt_number: attempt,
                bytes_written: 0,
                remote_digest: None,
                outcome,
            };
        }

        if !verify {
            acc.warn("Verification is off. Skipping.");
            return TransferAttempt {
                attempt_number: attempt,
                bytes_written,
                remote_digest: None,
                outcome: AttemptOutcome::Success,
            };
        }

        machine.advance(EngineState::Verifying(attempt));
        let remote_digest = match self.bounded(self.store.read(temp_name)).await {
            Ok(remote) => Some(fingerprint::digest(&remote)),
            Err(e) => {
                acc.warn(format!(
                    "Could not read back remote file on attempt #{}: {}",
                    attempt, e
                ));
                None
            }
        };

        let outcome = match remote_digest {
            Some(remote) if remote == local_digest => {
                acc.info("The fingerprint of the remote file matches the local compressed file.");
                AttemptOutcome::Success
            }
            Some(remote) => {
                acc.warn(format!(
                    "Remote fingerprint ({}) and local fingerprint ({}) differ.",
                    remote, local_digest
                ));
                acc.info(format!("Fail of backup on attempt #{}.", attempt));
                AttemptOutcome::VerifyMismatch
            }
            None => {
                acc.info(format!("Fail of backup on attempt #{}.", attempt));
                AttemptOutcome::VerifyMismatch
            }
        };

        TransferAttempt {
            attempt_number: attempt,
            bytes_written,
            remote_digest,
            outcome,
        }
    }

    /// Promote the verified temporary object to its final name.
    ///
    /// Stores with atomic replace get a single rename; others fall back to
    /// delete-then-rename. A failed rename leaves the verified bytes under the
    /// temporary name and is reported, not fatal.
    async fn commit(&self, temp_name: &str, final_name: &str, acc: &mut Accounting) -> CommitLocation {
        if !self.store.atomic_replace() {
            if let Err(e) = self.bounded(self.store.delete_if_exists(final_name)).await {
                tracing::debug!("Ignoring failure to delete previous {}: {}", final_name, e);
            }
        }

        match self.bounded(self.store.rename_or_replace(temp_name, final_name)).await {
            Ok(()) => {
                acc.info(format!("Renamed {} to {}.", temp_name, final_name));
                CommitLocation::Final
            }
            Err(e) => {
                acc.warn(format!(
                    "Could not rename {} to {}: {}. The verified archive is intact under {}; rename it manually.",
                    temp_name, final_name, e, temp_name
                ));
                CommitLocation::Temporary
            }
        }
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

fn reject(job: &mut BackupJob, acc: &mut Accounting, reason: String) -> TerminalOutcome {
    acc.error(format!("Refusing to start: {}.", reason));
    job.status = JobStatus::Failed;
    TerminalOutcome::Rejected { reason }
}

fn summarize(acc: &mut Accounting) {
    acc.info(format!(
        "Backup finished with {} errors and {} warnings.",
        acc.errors(),
        acc.warnings()
    ));
}

fn log_compression(result: &CompressionResult, acc: &mut Accounting) {
    for path in &result.succeeded {
        acc.info(format!("{} successfully added.", path.display()));
    }
    for failed in &result.failed {
        acc.warn(format!("Failed to add {}: {}", failed.path.display(), failed.reason));
    }
    if let Some(e) = &result.close_error {
        acc.warn(format!("Failed trying to close the archive: {}", e));
    }
    acc.info(format!(
        "Compression finished with {} successes and {} failures.",
        result.succeeded.len(),
        result.failed.len()
    ));
}

/// Read the finished archive and fingerprint it.
async fn load_archive(path: &Path) -> std::io::Result<(Bytes, Fingerprint)> {
    let data = Bytes::from(tokio::fs::read(path).await?);
    if data.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "compressed file is empty",
        ));
    }

    let hashed = data.clone();
    let digest = tokio::task::spawn_blocking(move || fingerprint::digest(&hashed))
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    Ok((data, digest))
}

/// Mark the job failed and drop its local archive.
async fn fail(job: &mut BackupJob) {
    job.status = JobStatus::Failed;
    if let Err(e) = tokio::fs::remove_file(&job.archive_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(job_id = %job.id, "Failed to remove local archive: {}", e);
        }
    }
}
