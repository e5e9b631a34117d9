//! A minimal terminal spinner for long imports and queries.

use std::io::Write;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::import::progress::ImportProgress;

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Frame interval.
const INTERVAL: Duration = Duration::from_millis(80);

/// A terminal spinner that runs in a background task.
///
/// The spinner writes to stderr so it doesn't interfere with query output on
/// stdout. Its message can be replaced while it spins, which is how import
/// progress is shown.
pub struct Spinner {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
    message: watch::Sender<String>,
}

impl Spinner {
    /// Start a spinner with the given message (e.g. `"importing"`).
    pub fn start(message: &str) -> Self {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (message_tx, message_rx) = watch::channel(message.to_string());

        let handle = tokio::spawn(async move {
            let mut i = 0;
            loop {
                let frame = FRAMES[i % FRAMES.len()];
                let message = message_rx.borrow().clone();
                // \r moves to start of line, \x1b[2K clears the line
                eprint!("\x1b[2K\r{frame} {message}");
                let _ = std::io::stderr().flush();

                tokio::select! {
                    _ = tokio::time::sleep(INTERVAL) => {}
                    _ = cancel_rx.changed() => break,
                }
                i += 1;
            }
            eprint!("\x1b[2K\r");
            let _ = std::io::stderr().flush();
        });

        Self {
            handle,
            cancel: cancel_tx,
            message: message_tx,
        }
    }

    /// Replace the text shown next to the spinner.
    pub fn set_message(&self, message: impl Into<String>) {
        self.message.send_replace(message.into());
    }

    /// Show an import report as `[ 42%] message`. Returns the line shown.
    pub fn show_progress(&self, progress: &ImportProgress) -> String {
        let line = progress_line(progress);
        self.set_message(line.clone());
        line
    }

    /// Stop the spinner and clear its line.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}

fn progress_line(progress: &ImportProgress) -> String {
    format!("[{:>3}%] {}", progress.percentage, progress.message)
}
