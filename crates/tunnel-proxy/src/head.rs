use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use crate::error::HandshakeError;

/// Upper bound on an HTTP request head, request line and headers together.
pub const MAX_HEAD_LEN: usize = 16 * 1024;

const READ_CHUNK: usize = 4096;

/// Request line of an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    /// Request target exactly as sent (`host:port` for CONNECT, an absolute
    /// URI for forwarded requests).
    pub target: String,
    pub version: String,
}

/// A request head read off the wire.
#[derive(Debug)]
pub struct RequestHead {
    pub line: RequestLine,
    /// Everything read from the socket, the head and any pipelined bytes
    /// after it.
    pub buffered: Bytes,
    /// Length of the head within `buffered`, blank line included.
    pub head_len: usize,
}

impl RequestHead {
    /// Bytes the client sent after the blank line ending the head.
    pub fn trailing(&self) -> Bytes {
        self.buffered.slice(self.head_len..)
    }
}

/// Read up to and including the blank line that ends a request head.
///
/// Reads in chunks, so bytes past the head may already have been taken off
/// the socket. They are kept in [`RequestHead::buffered`] and must be replayed
/// through [`Rewind`].
pub async fn read_request_head<S>(stream: &mut S) -> Result<RequestHead, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let head_len = loop {
        let searched = buf.len().saturating_sub(3);
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(if buf.is_empty() {
                HandshakeError::Io(io::ErrorKind::UnexpectedEof.into())
            } else {
                HandshakeError::Malformed("connection closed inside request head".into())
            });
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_head_end(&buf[searched..]) {
            break searched + pos;
        }
        if buf.len() > MAX_HEAD_LEN {
            return Err(HandshakeError::HeadTooLarge {
                limit: MAX_HEAD_LEN,
            });
        }
    };

    if head_len > MAX_HEAD_LEN {
        return Err(HandshakeError::HeadTooLarge {
            limit: MAX_HEAD_LEN,
        });
    }

    let line = parse_request_line(&buf[..head_len])?;
    Ok(RequestHead {
        line,
        buffered: Bytes::from(buf),
        head_len,
    })
}

/// Offset just past the first `\r\n\r\n`.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn parse_request_line(head: &[u8]) -> Result<RequestLine, HandshakeError> {
    let end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..end])
        .map_err(|_| HandshakeError::Malformed("request line is not UTF-8".into()))?;

    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HandshakeError::Malformed(format!(
            "bad request line {line:?}"
        )));
    };

    if method.is_empty() || target.is_empty() || !version.starts_with("HTTP/1.") {
        return Err(HandshakeError::Malformed(format!(
            "bad request line {line:?}"
        )));
    }

    Ok(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
    })
}

/// A stream that yields `prefix` before reading from `inner`.
///
/// Writes go straight to `inner`.
#[derive(Debug)]
pub struct Rewind<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> Rewind<S> {
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Rewind<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Rewind<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
