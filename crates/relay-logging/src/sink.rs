//! Background writer for the message log.

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::entry::{LogCategory, LogEntry};

/// Cheap clonable handle that feeds the writer task.
///
/// Recording never blocks and never fails from the caller's point of view:
/// entries flow over an unbounded channel, and write errors inside the task
/// are warned and dropped. Delivery of chat traffic must never hinge on the
/// log file being writable.
#[derive(Clone, Debug)]
pub struct MessageLog {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl MessageLog {
    /// Spawn the writer task appending to `path`.
    ///
    /// Returns the handle plus the task's `JoinHandle`; the task exits once
    /// every `MessageLog` clone has been dropped and the channel drains.
    #[must_use]
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(path, rx));
        (Self { tx }, task)
    }

    /// A handle that discards every entry. For tests and `--no-message-log`.
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Self { tx }
    }

    /// Record one entry, timestamped now. Fire-and-forget.
    pub fn record(&self, category: LogCategory, actor: &str, target: Option<&str>, content: &str) {
        let entry = LogEntry::now(category, actor, target, content);
        // Fails only when the writer task is gone, which is fine to ignore.
        let _ = self.tx.send(entry);
    }
}

async fn write_loop(path: PathBuf, mut rx: mpsc::UnboundedReceiver<LogEntry>) {
    let mut file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(f) => Some(f),
        Err(err) => {
            warn!(path = %path.display(), %err, "message log unavailable, entries will be dropped");
            None
        }
    };

    while let Some(entry) = rx.recv().await {
        let Some(f) = file.as_mut() else { continue };
        if let Err(err) = f.write_all(entry.format_line().as_bytes()).await {
            warn!(%err, "failed to append message log entry");
        }
    }

    if let Some(mut f) = file {
        if let Err(err) = f.flush().await {
            warn!(%err, "failed to flush message log");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
