//! Terminal progress UI: a thin spinner wrapper used during build/up so
//! long-running engine calls give visible feedback.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        bar.set_message(message.into());
        Spinner { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn finish_ok(&self, message: impl Into<String>) {
        self.bar
            .finish_with_message(format!("{} {}", style("✔").green(), message.into()));
    }

    pub fn finish_err(&self, message: impl Into<String>) {
        self.bar
            .finish_with_message(format!("{} {}", style("✘").red(), message.into()));
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
