//! Progress reporting for lane runs.
//!
//! [`ProgressCallback`] keeps the runner independent of how progress is
//! rendered. Binaries plug in an `indicatif` bar; tests use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running lane.
///
/// Implementations must be `Send + Sync` since units complete on blocking
/// worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of units (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
