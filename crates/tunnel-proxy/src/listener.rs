use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use audit_log::AuditSink;
use host_policy::HostPolicy;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};

use crate::context::{ConnectionContext, Protocol};
use crate::error::HandshakeError;
use crate::forward::Forwarder;
use crate::head::{read_request_head, Rewind};
use crate::outbound::Outbound;
use crate::{connect, forward, socks};

/// Pause after a failed accept so a persistent error (fd exhaustion) does
/// not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What the HTTP listener does with requests other than `CONNECT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMode {
    /// Forward them to their origin.
    #[default]
    Forward,
    /// Close the connection without a response.
    TunnelOnly,
}

/// Configuration for the HTTP listener.
pub struct HttpProxyConfig {
    pub listen_addr: SocketAddr,
    pub mode: HttpMode,
    /// How CONNECT tunnels reach their target.
    pub outbound: Outbound,
    pub policy: Arc<HostPolicy>,
    pub audit: AuditSink,
}

/// HTTP proxy listener: CONNECT tunnels, plus forwarding in
/// [`HttpMode::Forward`].
pub struct HttpProxy {
    listener: TcpListener,
    shared: Arc<HttpShared>,
}

struct HttpShared {
    mode: HttpMode,
    outbound: Outbound,
    policy: Arc<HostPolicy>,
    audit: AuditSink,
    forwarder: Forwarder,
}

impl HttpProxy {
    pub async fn bind(config: HttpProxyConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let forwarder = Forwarder::new(Arc::clone(&config.policy));
        Ok(Self {
            listener,
            shared: Arc::new(HttpShared {
                mode: config.mode,
                outbound: config.outbound,
                policy: config.policy,
                audit: config.audit,
                forwarder,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task each.
    pub async fn run(self) {
        tracing::info!(
            addr = %display_addr(&self.listener),
            mode = ?self.shared.mode,
            "http proxy listening"
        );
        let shared = self.shared;
        accept_loop(self.listener, "http", move |stream, remote_addr| {
            handle_http(stream, remote_addr, Arc::clone(&shared))
        })
        .await
    }
}

async fn handle_http(mut stream: TcpStream, remote_addr: SocketAddr, shared: Arc<HttpShared>) {
    let mut ctx = ConnectionContext::new(Protocol::Http, remote_addr, shared.audit.clone());
    ctx.accepted().await;

    let head = match read_request_head(&mut stream).await {
        Ok(head) => head,
        Err(err) => {
            ctx.rejected(&err).await;
            return;
        }
    };

    if head.line.method == "CONNECT" {
        ctx.protocol = Protocol::Connect;
        let client = Rewind::new(head.trailing(), stream);
        connect::tunnel(
            client,
            &head.line.target,
            &shared.policy,
            &shared.outbound,
            &mut ctx,
        )
        .await;
        return;
    }

    match shared.mode {
        HttpMode::Forward => {
            let client = Rewind::new(head.buffered, stream);
            forward::serve(client, shared.forwarder.clone(), &mut ctx).await;
        }
        HttpMode::TunnelOnly => {
            ctx.rejected(&HandshakeError::UnsupportedMethod(head.line.method))
                .await;
        }
    }
}

/// Configuration for the SOCKS5 listener.
pub struct SocksProxyConfig {
    pub listen_addr: SocketAddr,
    pub outbound: Outbound,
    pub policy: Arc<HostPolicy>,
    pub audit: AuditSink,
}

/// SOCKS5 listener.
pub struct SocksProxy {
    listener: TcpListener,
    shared: Arc<SocksShared>,
}

struct SocksShared {
    outbound: Outbound,
    policy: Arc<HostPolicy>,
    audit: AuditSink,
}

impl SocksProxy {
    pub async fn bind(config: SocksProxyConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        Ok(Self {
            listener,
            shared: Arc::new(SocksShared {
                outbound: config.outbound,
                policy: config.policy,
                audit: config.audit,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task each.
    pub async fn run(self) {
        tracing::info!(
            addr = %display_addr(&self.listener),
            outbound = ?self.shared.outbound,
            "socks proxy listening"
        );
        let shared = self.shared;
        accept_loop(self.listener, "socks", move |stream, remote_addr| {
            let shared = Arc::clone(&shared);
            async move {
                let mut ctx =
                    ConnectionContext::new(Protocol::Socks, remote_addr, shared.audit.clone());
                ctx.accepted().await;
                socks::tunnel(stream, &shared.policy, &shared.outbound, &mut ctx).await;
            }
        })
        .await
    }
}

async fn accept_loop<F, Fut>(listener: TcpListener, name: &'static str, handler: F)
where
    F: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                tokio::spawn(handler(stream, remote_addr));
            }
            Err(err) => {
                tracing::error!(listener = name, %err, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

fn display_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}
