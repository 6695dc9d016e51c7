//! Progress reporting for a build run.

use std::time::Duration;

/// Progress callback for reporting build status.
///
/// Implementations render a single status line that is updated in place.
/// One reporter lives for exactly one build run.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called after each unit of a chunked stage completes.
    fn stage_progress(&self, stage: &str, completed: usize, total: usize);
    /// Called once the run has finished successfully.
    fn done(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn stage_progress(&self, _stage: &str, _completed: usize, _total: usize) {}
    fn done(&self) {}
}

/// What a finished stage did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub items: usize,
    pub elapsed: Duration,
}

/// Whole-number percentage of `completed` out of `total`, rounded down.
pub fn percent(completed: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    completed.min(total) * 100 / total
}
