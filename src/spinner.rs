//! A terminal spinner with a live label, shown while provider calls run.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Frame interval.
const INTERVAL: Duration = Duration::from_millis(80);

/// Shared handle to the text drawn next to the spinner.
#[derive(Debug, Clone)]
pub struct SpinnerLabel(Arc<Mutex<String>>);

impl SpinnerLabel {
    pub fn set(&self, text: impl Into<String>) {
        *self.0.lock().unwrap() = text.into();
    }

    pub fn get(&self) -> String {
        self.0.lock().unwrap().clone()
    }
}

/// A terminal spinner that runs in a background task.
///
/// Writes to stderr so stdout stays clean for results. The label can be
/// updated from anywhere through [`Spinner::label`].
pub struct Spinner {
    handle: JoinHandle<()>,
    cancel: tokio::sync::watch::Sender<bool>,
    label: SpinnerLabel,
}

impl Spinner {
    /// Start a spinner with the given label (e.g. `"modernizing"`).
    pub fn start(label: &str) -> Self {
        let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
        let label = SpinnerLabel(Arc::new(Mutex::new(label.to_string())));
        let shown = label.clone();

        let handle = tokio::spawn(async move {
            let mut i = 0;
            loop {
                let frame = FRAMES[i % FRAMES.len()];
                // \r moves to start of line, \x1b[2K clears the line
                eprint!("\x1b[2K\r{frame} {}", shown.get());
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
            label,
        }
    }

    pub fn label(&self) -> SpinnerLabel {
        self.label.clone()
    }

    /// Stop the spinner and clear its line.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_single_braille_chars() {
        for frame in FRAMES {
            assert_eq!(frame.chars().count(), 1);
        }
    }

    #[tokio::test]
    async fn label_updates_are_visible() {
        let spinner = Spinner::start("modernizing");
        let label = spinner.label();
        label.set("modernizing 3/10");
        assert_eq!(spinner.label().get(), "modernizing 3/10");
        spinner.stop().await;
    }

    #[tokio::test]
    async fn spinner_immediate_stop() {
        let spinner = Spinner::start("quick");
        spinner.stop().await;
    }
}
