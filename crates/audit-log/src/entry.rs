use serde::{Deserialize, Serialize};

/// One line of the connection log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferRecord>,
}

impl AuditEntry {
    /// Create an entry stamped with a fresh UUID v4 and the current UTC time.
    pub fn new(
        event_type: AuditEventType,
        source: AuditSource,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
            transfer: None,
        }
    }

    /// Attach byte totals, builder style.
    pub fn with_transfer(mut self, transfer: TransferRecord) -> Self {
        self.transfer = Some(transfer);
        self
    }
}

/// Lifecycle events recorded per connection, plus process start/stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ProxyStarted,
    ProxyStopped,
    ConnectionAccepted,
    HandshakeRejected,
    HostBlocked,
    DialFailed,
    RequestForwarded,
    RelayCompleted,
}

/// Where an event came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSource {
    /// Listener or component name (`http`, `connect`, `socks`, `hostgate`).
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl AuditSource {
    /// Source with only a component name.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            connection_id: None,
            client: None,
            target: None,
        }
    }
}

/// Byte totals of a finished connection, seen from the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Bytes the client sent toward the target.
    pub sent: u64,
    /// Bytes delivered back to the client.
    pub received: u64,
}
