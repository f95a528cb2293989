use std::sync::atomic::{AtomicU64, Ordering};

/// Remembers the newest job a caller cares about.
///
/// Jobs cannot be cancelled, so a superseded job still completes; callers
/// record each new job id here and drop any outcome that is no longer
/// current.
#[derive(Debug, Default)]
pub struct RunTracker {
    latest: AtomicU64,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `job_id` the current run. Older ids never replace newer ones.
    pub fn track(&self, job_id: u64) {
        self.latest.fetch_max(job_id, Ordering::AcqRel);
    }

    pub fn is_current(&self, job_id: u64) -> bool {
        self.latest.load(Ordering::Acquire) == job_id
    }
}
