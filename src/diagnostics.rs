//! Out-of-band error reporting.
//!
//! Failures that must not interrupt a refresh (a flash that could not be
//! notified, a store that could not be reset) are handed to a [`Reporter`]
//! as free text.  What happens next depends on the frontend: the daemon only
//! logs them, the terminal view also shows the latest one in its status bar.

use tokio::sync::mpsc;
use tracing::warn;

pub trait Reporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Emits every report as a `warn` event on the `diagnostics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, message: &str) {
        warn!(target: "diagnostics", "{message}");
    }
}

/// Logs like [`LogReporter`] and also forwards the text to a channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, message: &str) {
        LogReporter.report(message);
        // Receiver gone means the UI has shut down; the log line is enough.
        let _ = self.tx.send(message.to_string());
    }
}
