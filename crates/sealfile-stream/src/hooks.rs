use crate::cancel::CancellationSignal;
use crate::progress::ProgressReporter;

/// Optional collaborators a session consults between chunks.
#[derive(Clone, Copy, Default)]
pub struct Hooks<'a> {
    pub progress: Option<&'a dyn ProgressReporter>,
    pub cancel: Option<&'a dyn CancellationSignal>,
}

impl<'a> Hooks<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a dyn CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn report(&self, fraction: f64, message: &str) {
        if let Some(progress) = self.progress {
            progress.report(fraction.clamp(0.0, 1.0), message);
        }
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.is_cancelled())
    }
}

impl std::fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}
