//! SOCKS5 server side (RFC 1928), `CONNECT` only, no authentication.

use std::net::{Ipv4Addr, Ipv6Addr};

use host_policy::{HostPolicy, Verdict};
use relay_engine::{relay, MeteredStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::connect::BLOCKED_RESPONSE;
use crate::context::{ConnectionContext, Outcome};
use crate::error::HandshakeError;
use crate::outbound::{join_host_port, Outbound};

pub const VERSION5: u8 = 0x05;
pub const AUTH_NONE: u8 = 0x00;
pub const AUTH_NO_ACCEPT: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const REP_SUCCESS: u8 = 0x00;
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;
pub const REP_ADDR_NOT_SUPPORTED: u8 = 0x08;

/// Destination named in a SOCKS5 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksTarget {
    /// Dotted IPv4, bare IPv6, or a domain name as sent.
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for SocksTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

/// Run method negotiation and read the request.
///
/// On success the client has been told "no authentication" and the target is
/// returned; no reply to the request itself has been sent yet. Unsupported
/// commands and address types get an error reply before the error is
/// returned.
pub async fn handshake<S>(stream: &mut S) -> Result<SocksTarget, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = [0u8; 2];
    stream.read_exact(&mut greeting).await?;
    if greeting[0] != VERSION5 {
        return Err(HandshakeError::SocksVersion(greeting[0]));
    }

    let mut methods = vec![0u8; greeting[1] as usize];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&AUTH_NONE) {
        stream.write_all(&[VERSION5, AUTH_NO_ACCEPT]).await?;
        return Err(HandshakeError::NoAcceptableAuth);
    }
    stream.write_all(&[VERSION5, AUTH_NONE]).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [version, cmd, _reserved, atyp] = header;
    if version != VERSION5 {
        return Err(HandshakeError::SocksVersion(version));
    }

    let target = match read_target(stream, atyp).await {
        Ok(target) => target,
        Err(err @ HandshakeError::AddressType(_)) => {
            send_reply(stream, REP_ADDR_NOT_SUPPORTED).await?;
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    if cmd != CMD_CONNECT {
        send_reply(stream, REP_CMD_NOT_SUPPORTED).await?;
        return Err(HandshakeError::SocksCommand(cmd));
    }

    Ok(target)
}

/// Read DST.ADDR and DST.PORT for the given address type.
pub async fn read_target<R>(r: &mut R, atyp: u8) -> Result<SocksTarget, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let host = match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            r.read_exact(&mut octets).await?;
            Ipv4Addr::from(octets).to_string()
        }
        ATYP_DOMAIN => {
            let len = r.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            r.read_exact(&mut name).await?;
            String::from_utf8(name)
                .ok()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| HandshakeError::InvalidTarget("undecodable domain name".into()))?
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            r.read_exact(&mut octets).await?;
            Ipv6Addr::from(octets).to_string()
        }
        other => return Err(HandshakeError::AddressType(other)),
    };
    let port = r.read_u16().await?;
    Ok(SocksTarget { host, port })
}

/// Send a reply with a zeroed IPv4 bind address.
pub async fn send_reply<W>(w: &mut W, rep: u8) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(&[VERSION5, rep, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await
}

/// Serve one SOCKS5 client from greeting to teardown.
///
/// The blocklist sees the bare host, without the port. A blocked host gets
/// the same teapot bytes an HTTP client would. A failed dial closes the
/// connection without a reply, as the CONNECT path does.
pub async fn tunnel<S>(
    mut client: S,
    policy: &HostPolicy,
    outbound: &Outbound,
    ctx: &mut ConnectionContext,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let target = match handshake(&mut client).await {
        Ok(target) => target,
        Err(err) => {
            ctx.rejected(&err).await;
            return;
        }
    };
    ctx.set_target(target.to_string());

    if let Verdict::Block { entry } = policy.check(&target.host) {
        ctx.blocked(&entry).await;
        let _ = client.write_all(BLOCKED_RESPONSE).await;
        let _ = client.shutdown().await;
        return;
    }

    let upstream = match outbound.dial(&target.host, target.port).await {
        Ok(stream) => stream,
        Err(err) => {
            ctx.dial_failed(&err).await;
            return;
        }
    };

    if let Err(err) = send_reply(&mut client, REP_SUCCESS).await {
        tracing::debug!(connection_id = %ctx.id, %err, "client left before tunnel was confirmed");
        ctx.completed(Outcome::Relayed, 0, 0).await;
        return;
    }

    let mut client = MeteredStream::new(client);
    let mut upstream = MeteredStream::new(upstream);
    let totals = relay(&mut client, &mut upstream).await;
    ctx.completed(Outcome::Relayed, totals.a_to_b, totals.b_to_a)
        .await;
}
