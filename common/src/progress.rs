//! The progress reporting seam.
//!
//! Long walks over the address space report a completion percentage through
//! this trait instead of printing, so callers decide where progress goes.

use tracing::info;

pub trait ProgressReporter: Send + Sync {
    /// `percent` is in `0.0..=100.0`.
    fn report(&self, percent: f64);
}

impl<F> ProgressReporter for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent)
    }
}

/// Writes progress as plain log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, percent: f64) {
        info!("Generator {percent:.2}%");
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _percent: f64) {}
}
