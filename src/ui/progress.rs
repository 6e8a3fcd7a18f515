//! Spinner shown while waiting on a contended cache lock

use super::context::UiContext;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner with a silent fallback outside interactive terminals
pub struct WaitSpinner {
    bar: Option<ProgressBar>,
}

impl WaitSpinner {
    /// Start spinning with `message` (no-op when not interactive)
    pub fn start(ctx: &UiContext, message: &str) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(spinner_style) = ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}  {elapsed:.dim}")
            {
                bar.set_style(spinner_style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    /// Remove the spinner from the terminal
    pub fn finish(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for WaitSpinner {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_is_silent_when_not_interactive() {
        let spinner = WaitSpinner::start(&UiContext::non_interactive(), "Waiting for lock");
        assert!(spinner.bar.is_none());
        spinner.finish();
    }
}
