//! Scan progress reporting.

use medialib_db::FlushReport;

use crate::session::Observation;
use crate::sweep::SweepReport;

/// Trait for receiving scan progress updates.
pub trait ScanProgress {
    /// Called when a phase starts (e.g., "Marking sd stale").
    fn on_phase(&self, message: &str);

    /// Called after each observed file with the running count.
    fn on_file(&self, current: usize, path: &str, outcome: Observation);

    /// Called after a queue has been committed.
    fn on_flush(&self, report: &FlushReport);

    /// Called once the sweep has committed.
    fn on_complete(&self, report: &SweepReport);
}

/// A no-op progress reporter that discards all updates.
pub struct SilentScanProgress;

impl ScanProgress for SilentScanProgress {
    fn on_phase(&self, _message: &str) {}
    fn on_file(&self, _current: usize, _path: &str, _outcome: Observation) {}
    fn on_flush(&self, _report: &FlushReport) {}
    fn on_complete(&self, _report: &SweepReport) {}
}

/// A progress reporter that logs to the `log` crate.
pub struct LogScanProgress;

impl ScanProgress for LogScanProgress {
    fn on_phase(&self, message: &str) {
        log::info!("{}", message);
    }

    fn on_file(&self, current: usize, path: &str, outcome: Observation) {
        if current % 500 == 0 {
            log::info!("  [{}] {}", current, path);
        } else {
            log::debug!("  {:?} {}", outcome, path);
        }
    }

    fn on_flush(&self, report: &FlushReport) {
        log::debug!(
            "  committed {} {} statement(s)",
            report.statements,
            report.kind
        );
    }

    fn on_complete(&self, report: &SweepReport) {
        log::info!(
            "Scan of {} complete: {} new, {} updated, {} removed, {} empty folder(s) removed",
            report.storage_id,
            report.inserted.len(),
            report.updated.len(),
            report.deleted_media.len(),
            report.deleted_folders.len()
        );
    }
}
