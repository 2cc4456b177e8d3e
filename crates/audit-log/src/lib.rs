//! Append-only JSON-lines log of proxy connection events.
//!
//! Every connection handled by hostgate emits a short sequence of lifecycle
//! events (accepted, blocked, dial failed, completed with byte totals). When a
//! log path is configured those events are serialised here, one JSON object
//! per line, by a background task fed through a bounded channel.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = AuditSink::start("/var/log/hostgate/connections.jsonl").await?;
//!
//! sink.log(AuditEntry::new(
//!     AuditEventType::ProxyStarted,
//!     AuditSource::new("hostgate"),
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

pub use entry::{AuditEntry, AuditEventType, AuditSource, TransferRecord};
pub use sink::AuditSink;
pub use writer::{AuditWriteError, AuditWriter};
