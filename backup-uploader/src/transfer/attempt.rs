//! Per-attempt records of the upload loop.

use crate::fingerprint::Fingerprint;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Write failed and verification was disabled
    WriteFailed,
    /// Read-back digest differed from the local digest, or read-back failed
    VerifyMismatch,
    /// Write failed, so the enabled verification step was not run
    VerifySkippedBecauseWriteFailed,
}

impl AttemptOutcome {
    pub fn is_write_failure(self) -> bool {
        matches!(
            self,
            AttemptOutcome::WriteFailed | AttemptOutcome::VerifySkippedBecauseWriteFailed
        )
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::WriteFailed => "write failed",
            AttemptOutcome::VerifyMismatch => "verification mismatch",
            AttemptOutcome::VerifySkippedBecauseWriteFailed => "verification skipped, write failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAttempt {
    pub attempt_number: u32,
    pub bytes_written: u64,
    pub remote_digest: Option<Fingerprint>,
    pub outcome: AttemptOutcome,
}
