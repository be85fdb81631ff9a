use indicatif::{ProgressBar, ProgressStyle};
use sealfile_stream::ProgressReporter;

/// Resolution of the bar; session progress arrives as a fraction.
const STEPS: u64 = 1000;

/// Terminal progress bar fed by a pipeline session.
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new(prefix: &str) -> Self {
        let bar = ProgressBar::new(STEPS);
        bar.set_style(
            ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_prefix(prefix.to_string());
        Self { bar }
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, fraction: f64, message: &str) {
        self.bar.set_position((fraction * STEPS as f64).round() as u64);
        self.bar.set_message(message.to_string());
    }
}
