use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::metered::MeteredStream;

/// Bytes moved by a finished relay, per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayTotals {
    /// Bytes delivered from `a` into `b`.
    pub a_to_b: u64,
    /// Bytes delivered from `b` into `a`.
    pub b_to_a: u64,
}

/// Direction of a copy loop, used for log fields.
#[derive(Debug, Clone, Copy)]
enum Direction {
    AToB,
    BToA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => f.write_str("a->b"),
            Direction::BToA => f.write_str("b->a"),
        }
    }
}

/// Copy bytes between `a` and `b` in both directions until both are done.
///
/// Each direction runs until its source hits EOF or fails, or its
/// destination fails a write. When a direction stops, a write shutdown is
/// sent to its destination so the far peer sees end-of-stream; neither
/// stream is dropped here, the caller still owns and closes both. A failure
/// in one direction never cancels the other.
///
/// The returned totals are measured on the destination side of each
/// direction after both loops have finished, so bytes that made it across
/// before a failure are still counted.
pub async fn relay<A, B>(a: &mut MeteredStream<A>, b: &mut MeteredStream<B>) -> RelayTotals
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let a_meter = a.meter();
    let b_meter = b.meter();
    let a_base = a_meter.bytes_written();
    let b_base = b_meter.bytes_written();

    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    tokio::join!(
        pump(&mut a_read, &mut b_write, Direction::AToB),
        pump(&mut b_read, &mut a_write, Direction::BToA),
    );

    RelayTotals {
        a_to_b: b_meter.bytes_written() - b_base,
        b_to_a: a_meter.bytes_written() - a_base,
    }
}

/// One direction of the relay.
async fn pump<R, W>(src: &mut R, dst: &mut W, direction: Direction)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(src, dst).await {
        Ok(bytes) => {
            tracing::trace!(%direction, bytes, "relay direction reached eof");
        }
        Err(err) => {
            tracing::debug!(%direction, %err, "relay direction failed");
        }
    }

    if let Err(err) = dst.shutdown().await {
        if err.kind() != io::ErrorKind::NotConnected {
            tracing::trace!(%direction, %err, "write shutdown failed");
        }
    }
}
