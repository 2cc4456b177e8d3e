use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use crate::error::DialError;

/// How a tunnel reaches its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Plain TCP connect to the target.
    Direct,
    /// Through an upstream SOCKS5 server, no authentication.
    Socks5 { proxy: SocketAddr },
}

impl Outbound {
    /// Open a stream to `host:port`.
    ///
    /// For [`Outbound::Socks5`] the hostname is passed to the upstream
    /// unresolved.
    pub async fn dial(&self, host: &str, port: u16) -> Result<OutboundStream, DialError> {
        let dialed = match self {
            Outbound::Direct => TcpStream::connect((host, port))
                .await
                .map(OutboundStream::Direct),
            Outbound::Socks5 { proxy } => Socks5Stream::connect(*proxy, (host, port))
                .await
                .map(OutboundStream::Socks5)
                .map_err(socks_to_io),
        };

        dialed.map_err(|source| DialError {
            target: join_host_port(host, port),
            source,
        })
    }
}

fn socks_to_io(err: tokio_socks::Error) -> io::Error {
    match err {
        tokio_socks::Error::Io(err) => err,
        other => io::Error::other(other),
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// An established outbound leg.
pub enum OutboundStream {
    Direct(TcpStream),
    Socks5(Socks5Stream<TcpStream>),
}

impl fmt::Debug for OutboundStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundStream::Direct(s) => f.debug_tuple("Direct").field(s).finish(),
            OutboundStream::Socks5(s) => f
                .debug_tuple("Socks5")
                .field(&s.target_addr())
                .finish(),
        }
    }
}

impl AsyncRead for OutboundStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutboundStream::Direct(s) => Pin::new(s).poll_read(cx, buf),
            OutboundStream::Socks5(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for OutboundStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            OutboundStream::Direct(s) => Pin::new(s).poll_write(cx, data),
            OutboundStream::Socks5(s) => Pin::new(s).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutboundStream::Direct(s) => Pin::new(s).poll_flush(cx),
            OutboundStream::Socks5(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutboundStream::Direct(s) => Pin::new(s).poll_shutdown(cx),
            OutboundStream::Socks5(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
