//! Upload of the archive: retry loop, verification and commit.

pub mod attempt;
pub mod engine;

pub use attempt::{AttemptOutcome, TransferAttempt};
pub use engine::{TransferEngine, DEFAULT_OPERATION_TIMEOUT};
