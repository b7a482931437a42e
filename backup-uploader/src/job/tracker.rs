//! Registry of running job ids.
//!
//! A job id names the local archive and both remote objects, so two runs
//! with the same id must never overlap.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<Mutex<HashSet<String>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide tracker shared by every engine that does not get its own.
    pub fn global() -> &'static JobTracker {
        static GLOBAL: OnceLock<JobTracker> = OnceLock::new();
        GLOBAL.get_or_init(JobTracker::new)
    }

    fn jobs(&self) -> MutexGuard<'_, HashSet<String>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `job_id` for the caller. Returns `None` if it is already running.
    pub fn claim(&self, job_id: &str) -> Option<JobClaim> {
        if !self.jobs().insert(job_id.to_string()) {
            return None;
        }
        Some(JobClaim {
            tracker: self.clone(),
            job_id: job_id.to_string(),
        })
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.jobs().contains(job_id)
    }

    pub fn running_count(&self) -> usize {
        self.jobs().len()
    }
}

/// Releases the job id when dropped.
pub struct JobClaim {
    tracker: JobTracker,
    job_id: String,
}

impl JobClaim {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for JobClaim {
    fn drop(&mut self) {
        self.tracker.jobs().remove(&self.job_id);
    }
}
