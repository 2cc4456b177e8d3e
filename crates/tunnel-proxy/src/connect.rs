//! HTTP `CONNECT` tunnels.

use host_policy::{matcher, HostPolicy, Verdict};
use relay_engine::{relay, MeteredStream};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::context::{ConnectionContext, Outcome};
use crate::error::HandshakeError;
use crate::outbound::Outbound;

/// Written to the client once the outbound leg is open.
pub const CONNECT_ESTABLISHED: &[u8] =
    b"HTTP/1.1 200 Connection Established\r\nProxy-agent: hostgate\r\nConnection: close\r\n\r\n";

/// Written to the client, verbatim, when the target is blocklisted.
pub const BLOCKED_RESPONSE: &[u8] = b"HTTP/1.1 418 I'm a teapot\r\n\r\n";

/// Port assumed when a CONNECT target carries none.
pub const DEFAULT_CONNECT_PORT: u16 = 443;

/// Split a CONNECT target into host and port, defaulting the port to 443.
///
/// `example.com` and `[2001:db8::1]` get the default port; `host:port`
/// forms are split as usual. Anything else (`host:`, `host:https`, an
/// unbracketed IPv6 literal) is rejected.
pub fn normalize_target(target: &str) -> Option<(&str, u16)> {
    if let Some(split) = matcher::split_host_port(target) {
        return Some(split);
    }
    if let Some(inner) = target.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return (!inner.is_empty()).then_some((inner, DEFAULT_CONNECT_PORT));
    }
    if target.is_empty() || target.contains([':', '[', ']', '/']) {
        return None;
    }
    Some((target, DEFAULT_CONNECT_PORT))
}

/// Serve a CONNECT tunnel whose request head has already been read.
///
/// `client` must replay any bytes the client sent after the head. The
/// blocklist sees `target` exactly as the client wrote it. A blocked target
/// gets [`BLOCKED_RESPONSE`] and nothing is dialed.
pub async fn tunnel<S>(
    mut client: S,
    target: &str,
    policy: &HostPolicy,
    outbound: &Outbound,
    ctx: &mut ConnectionContext,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ctx.set_target(target);

    if let Verdict::Block { entry } = policy.check(target) {
        ctx.blocked(&entry).await;
        let _ = client.write_all(BLOCKED_RESPONSE).await;
        let _ = client.shutdown().await;
        return;
    }

    let Some((host, port)) = normalize_target(target) else {
        ctx.rejected(&HandshakeError::InvalidTarget(target.to_string()))
            .await;
        return;
    };

    let upstream = match outbound.dial(host, port).await {
        Ok(stream) => stream,
        Err(err) => {
            ctx.dial_failed(&err).await;
            return;
        }
    };

    if let Err(err) = client.write_all(CONNECT_ESTABLISHED).await {
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
