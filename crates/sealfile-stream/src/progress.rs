//! Advisory progress reporting

/// Receives `(fraction_complete, message)` updates, with fraction in `0.0..=1.0`.
///
/// Reports are advisory; a session behaves identically with or without one.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, fraction: f64, message: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _fraction: f64, _message: &str) {}
}
