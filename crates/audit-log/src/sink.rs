use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::AuditEntry;
use crate::writer::AuditWriter;

/// Entries buffered between connection tasks and the writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Idle time after which buffered lines are flushed to disk.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Cloneable handle for submitting [`AuditEntry`] values.
///
/// A sink is either backed by a background writer task or disabled, in which
/// case [`log`](Self::log) is a no-op. Handlers always hold a sink and do not
/// need to care which.
#[derive(Clone, Debug)]
pub struct AuditSink {
    tx: Option<mpsc::Sender<AuditEntry>>,
}

impl AuditSink {
    /// Open the log at `path` and spawn the writer task.
    ///
    /// The task exits after a final flush once every clone of the sink has
    /// been dropped. Write errors are reported through `tracing` and the
    /// entry is skipped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), crate::writer::AuditWriteError> {
        let (tx, rx) = mpsc::channel::<AuditEntry>(CHANNEL_BUFFER);
        let writer = AuditWriter::new(path).await?;
        let handle = tokio::spawn(drain(writer, rx));
        Ok((Self { tx: Some(tx) }, handle))
    }

    /// A sink that drops every entry.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue an entry, waiting for channel capacity if needed.
    pub async fn log(&self, entry: AuditEntry) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.send(entry).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "connection log writer has stopped, entry dropped"
            );
        }
    }
}

async fn drain(mut writer: AuditWriter, mut rx: mpsc::Receiver<AuditEntry>) {
    let mut pending = false;

    loop {
        match tokio::time::timeout(FLUSH_INTERVAL, rx.recv()).await {
            Ok(Some(entry)) => match writer.write(&entry).await {
                Ok(()) => pending = true,
                Err(err) => tracing::error!(%err, "failed to write connection log entry"),
            },
            Ok(None) => {
                if pending {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "final connection log flush failed");
                    }
                }
                tracing::debug!("connection log writer stopped");
                return;
            }
            Err(_idle) => {
                if pending {
                    match writer.flush().await {
                        Ok(()) => pending = false,
                        Err(err) => tracing::error!(%err, "connection log flush failed"),
                    }
                }
            }
        }
    }
}
