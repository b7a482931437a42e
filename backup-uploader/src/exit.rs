//! Process exit codes for the command-line wrapper.

use crate::job::TerminalOutcome;
use crate::utils::errors::BackupError;

pub const EXIT_NORMAL: u8 = 0;
pub const EXIT_TEMP_DIR: u8 = 1;
pub const EXIT_LOG: u8 = 2;
pub const EXIT_COMPRESS: u8 = 3;
pub const EXIT_TRANSFER: u8 = 4;
pub const EXIT_VERIFY: u8 = 5;
pub const EXIT_CONFIG: u8 = 6;
pub const EXIT_CANCELLED: u8 = 130;
pub const EXIT_UNKNOWN: u8 = 254;

/// Exit code for a finished run.
pub fn outcome_code(outcome: &TerminalOutcome) -> u8 {
    match outcome {
        TerminalOutcome::Committed { .. } => EXIT_NORMAL,
        TerminalOutcome::CompressionFailed => EXIT_COMPRESS,
        TerminalOutcome::ReadFailed => EXIT_TRANSFER,
        TerminalOutcome::TransferExhausted { last, .. } if last.is_write_failure() => EXIT_TRANSFER,
        TerminalOutcome::TransferExhausted { .. } => EXIT_VERIFY,
        TerminalOutcome::Cancelled { .. } => EXIT_CANCELLED,
        TerminalOutcome::Rejected { .. } => EXIT_UNKNOWN,
    }
}

/// Exit code for a run that could not start.
pub fn error_code(err: &BackupError) -> u8 {
    match err {
        BackupError::TempDir(_) => EXIT_TEMP_DIR,
        BackupError::Log(_) => EXIT_LOG,
        BackupError::Config(_) | BackupError::InvalidJobId(_) => EXIT_CONFIG,
        BackupError::Http(_) => EXIT_TRANSFER,
        // Same code as a run the engine itself rejects
        BackupError::JobInUse(_) => EXIT_UNKNOWN,
        BackupError::Io(_) => EXIT_UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CommitLocation;
    use crate::transfer::AttemptOutcome;

    #[test]
    fn test_outcome_codes() {
        let committed = TerminalOutcome::Committed {
            attempts: 1,
            location: CommitLocation::Temporary,
        };
        assert_eq!(outcome_code(&committed), EXIT_NORMAL);
        assert_eq!(outcome_code(&TerminalOutcome::CompressionFailed), EXIT_COMPRESS);
        assert_eq!(outcome_code(&TerminalOutcome::ReadFailed), EXIT_TRANSFER);
        assert_eq!(
            outcome_code(&TerminalOutcome::TransferExhausted {
                attempts: 3,
                last: AttemptOutcome::WriteFailed
            }),
            EXIT_TRANSFER
        );
        assert_eq!(
            outcome_code(&TerminalOutcome::TransferExhausted {
                attempts: 3,
                last: AttemptOutcome::VerifyMismatch
            }),
            EXIT_VERIFY
        );
        assert_eq!(outcome_code(&TerminalOutcome::Cancelled { attempts: 1 }), EXIT_CANCELLED);
    }

    #[test]
    fn test_error_codes() {
        let io = || std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(error_code(&BackupError::TempDir(io())), EXIT_TEMP_DIR);
        assert_eq!(error_code(&BackupError::Log(io())), EXIT_LOG);
        assert_eq!(error_code(&BackupError::Config("x".into())), EXIT_CONFIG);
        assert_eq!(error_code(&BackupError::Io(io())), EXIT_UNKNOWN);
        assert_eq!(
            error_code(&BackupError::JobInUse("nightly".into())),
            outcome_code(&TerminalOutcome::Rejected {
                reason: "job nightly is already running".into()
            })
        );
    }
}
