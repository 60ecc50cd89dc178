//! Terminal progress for scans.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use medialib_db::FlushReport;
use medialib_scan::{Observation, ScanProgress, SweepReport};

/// A single spinner showing the running file count and current path.
pub(crate) struct ScanSpinner {
    bar: ProgressBar,
}

impl ScanSpinner {
    /// When `quiet` is true the spinner is hidden.
    pub(crate) fn new(quiet: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("/-\\|");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub(crate) fn finish(&self) {
        self.bar.disable_steady_tick();
        self.bar.finish_and_clear();
    }
}

impl ScanProgress for ScanSpinner {
    fn on_phase(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_file(&self, current: usize, path: &str, outcome: Observation) {
        self.bar.set_message(format!("[{current}] {path}"));
        if outcome != Observation::Revalidated {
            self.bar.suspend(|| log::debug!("{:?} {}", outcome, path));
        }
    }

    fn on_flush(&self, report: &FlushReport) {
        self.bar.suspend(|| {
            log::debug!(
                "committed {} {} statement(s) in {} chunk(s)",
                report.statements,
                report.kind,
                report.chunks
            )
        });
    }

    fn on_complete(&self, _report: &SweepReport) {
        self.finish();
    }
}
