//! Sync progress reporting.

/// Trait for receiving progress updates during a reconciliation pass.
pub trait SyncProgress {
    /// Called after each path is processed within a page.
    fn on_item(&self, current: usize, total: usize, path: &str);

    /// Called when a phase starts (e.g., "Reconciling armor page").
    fn on_phase(&self, message: &str);

    /// Called when the pass is complete.
    fn on_complete(&self, message: &str);
}

/// A no-op progress reporter that discards all updates.
pub struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn on_item(&self, _current: usize, _total: usize, _path: &str) {}
    fn on_phase(&self, _message: &str) {}
    fn on_complete(&self, _message: &str) {}
}

/// A progress reporter that logs to the `log` crate.
pub struct LogProgress;

impl SyncProgress for LogProgress {
    fn on_item(&self, current: usize, total: usize, path: &str) {
        if current.is_multiple_of(100) || current == total {
            log::info!("  [{}/{}] {}", current, total, path);
        }
    }

    fn on_phase(&self, message: &str) {
        log::info!("{}", message);
    }

    fn on_complete(&self, message: &str) {
        log::info!("{}", message);
    }
}
