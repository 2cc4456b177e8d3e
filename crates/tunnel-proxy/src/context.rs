use std::fmt;
use std::net::{IpAddr, SocketAddr};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource, TransferRecord};

use crate::error::{DialError, HandshakeError};

/// Ingress protocol of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain HTTP forwarding (absolute-form requests).
    Http,
    /// HTTP `CONNECT` tunnel.
    Connect,
    /// SOCKS5 tunnel.
    Socks,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Http => "http",
            Protocol::Connect => "connect",
            Protocol::Socks => "socks",
        })
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Still in progress.
    Open,
    /// The client broke protocol; nothing was dialed.
    Rejected,
    /// The target is on the blocklist.
    Blocked { entry: String },
    /// The outbound leg could not be opened.
    DialFailed,
    /// A tunnel was established and has finished relaying.
    Relayed,
    /// One or more HTTP requests were forwarded over this connection.
    Forwarded,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Open => "open",
            Outcome::Rejected => "rejected",
            Outcome::Blocked { .. } => "blocked",
            Outcome::DialFailed => "dial_failed",
            Outcome::Relayed => "relayed",
            Outcome::Forwarded => "forwarded",
        }
    }
}

/// Per-connection state, created on accept and logged on completion.
///
/// Each lifecycle method emits one `tracing` event and one audit entry.
pub struct ConnectionContext {
    pub id: uuid::Uuid,
    /// Client address as logged.
    pub client: String,
    pub protocol: Protocol,
    pub target: Option<String>,
    pub outcome: Outcome,
    pub transfer: TransferRecord,
    audit: AuditSink,
}

impl ConnectionContext {
    pub fn new(protocol: Protocol, remote_addr: SocketAddr, audit: AuditSink) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            client: client_identity(remote_addr),
            protocol,
            target: None,
            outcome: Outcome::Open,
            transfer: TransferRecord::default(),
            audit,
        }
    }

    pub fn set_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        tracing::debug!(connection_id = %self.id, protocol = %self.protocol, destination = %target, "target requested");
        self.target = Some(target);
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    pub async fn accepted(&self) {
        tracing::info!(
            connection_id = %self.id,
            client = %self.client,
            protocol = %self.protocol,
            "connection accepted"
        );
        self.emit(AuditEventType::ConnectionAccepted, serde_json::json!({}))
            .await;
    }

    pub async fn rejected(&mut self, err: &HandshakeError) {
        self.outcome = Outcome::Rejected;
        tracing::info!(
            connection_id = %self.id,
            client = %self.client,
            protocol = %self.protocol,
            %err,
            "handshake rejected"
        );
        self.emit(
            AuditEventType::HandshakeRejected,
            serde_json::json!({ "error": err.to_string() }),
        )
        .await;
    }

    pub async fn blocked(&mut self, entry: &str) {
        self.outcome = Outcome::Blocked {
            entry: entry.to_string(),
        };
        tracing::warn!(
            connection_id = %self.id,
            client = %self.client,
            protocol = %self.protocol,
            destination = self.target.as_deref().unwrap_or("-"),
            entry,
            "blocked host"
        );
        self.emit(
            AuditEventType::HostBlocked,
            serde_json::json!({ "entry": entry }),
        )
        .await;
    }

    pub async fn dial_failed(&mut self, err: &DialError) {
        self.outcome = Outcome::DialFailed;
        tracing::warn!(
            connection_id = %self.id,
            client = %self.client,
            protocol = %self.protocol,
            %err,
            "dial failed"
        );
        self.emit(
            AuditEventType::DialFailed,
            serde_json::json!({ "error": err.to_string() }),
        )
        .await;
    }

    /// Record final byte totals. `sent` is client to target, `received` is
    /// target to client.
    pub async fn completed(&mut self, outcome: Outcome, sent: u64, received: u64) {
        self.outcome = outcome;
        self.transfer = TransferRecord { sent, received };
        tracing::info!(
            connection_id = %self.id,
            client = %self.client,
            protocol = %self.protocol,
            destination = self.target.as_deref().unwrap_or("-"),
            outcome = self.outcome.label(),
            sent,
            received,
            "data transferred"
        );
        let entry = AuditEntry::new(
            AuditEventType::RelayCompleted,
            self.source(),
            serde_json::json!({ "outcome": self.outcome.label() }),
        )
        .with_transfer(self.transfer);
        self.audit.log(entry).await;
    }

    pub fn source(&self) -> AuditSource {
        AuditSource {
            component: self.protocol.to_string(),
            connection_id: Some(self.id.to_string()),
            client: Some(self.client.clone()),
            target: self.target.clone(),
        }
    }

    async fn emit(&self, event_type: AuditEventType, details: serde_json::Value) {
        self.audit
            .log(AuditEntry::new(event_type, self.source(), details))
            .await;
    }
}

/// The client address as it appears in logs.
///
/// IPv4 clients are logged by bare address, including IPv4 peers that reach
/// a dual-stack listener as `::ffff:a.b.c.d`. Other IPv6 clients keep their
/// port so concurrent connections stay distinguishable.
pub fn client_identity(remote_addr: SocketAddr) -> String {
    match remote_addr.ip() {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => remote_addr.to_string(),
        },
    }
}
