use std::path::Path;

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::entry::AuditEntry;

/// Errors that can occur during connection log I/O.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create log directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open connection log: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write connection log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush connection log: {0}")]
    Flush(std::io::Error),
}

/// Buffered append-only JSON-lines writer.
///
/// Every [`write`](Self::write) appends exactly one newline-terminated JSON
/// object. Data reaches the file on [`flush`](Self::flush).
pub struct AuditWriter {
    out: BufWriter<tokio::fs::File>,
}

impl AuditWriter {
    /// Open `path` for appending, creating it and its parent directories.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, AuditWriteError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AuditWriteError::CreateDir)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(AuditWriteError::OpenFile)?;

        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub async fn write(&mut self, entry: &AuditEntry) -> Result<(), AuditWriteError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.out
            .write_all(&line)
            .await
            .map_err(AuditWriteError::Write)
    }

    pub async fn flush(&mut self) -> Result<(), AuditWriteError> {
        self.out.flush().await.map_err(AuditWriteError::Flush)
    }
}
