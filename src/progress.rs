// Transfer feedback on stderr. Stdout belongs to the remote command.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    enabled: bool,
}

impl TransferProgress {
    pub fn new(enabled: bool) -> Self {
        TransferProgress { enabled }
    }

    /// Enabled only when stderr is a terminal.
    pub fn for_stderr() -> Self {
        use crossterm::tty::IsTty;
        Self::new(std::io::stderr().is_tty())
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn spinner(&self, message: String) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}
