use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared byte counters for one [`MeteredStream`].
///
/// Counters only ever grow. Reads taken while I/O is in flight are a lower
/// bound of the final value.
#[derive(Debug, Default)]
pub struct Meter {
    read: AtomicU64,
    written: AtomicU64,
}

impl Meter {
    /// Total bytes read from the wrapped stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.read.load(Ordering::Acquire)
    }

    /// Total bytes written to the wrapped stream so far.
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    fn add_read(&self, n: usize) {
        if n > 0 {
            self.read.fetch_add(n as u64, Ordering::AcqRel);
        }
    }

    fn add_written(&self, n: usize) {
        if n > 0 {
            self.written.fetch_add(n as u64, Ordering::AcqRel);
        }
    }
}

/// A stream wrapper that counts bytes read and written.
///
/// All I/O is forwarded to the inner stream untouched: the same results,
/// errors and pending states come back to the caller. Counters move only when
/// the inner stream reports a successful transfer of at least one byte.
///
/// The counters live in an [`Arc<Meter>`] so totals can still be read after
/// the stream has been handed to another owner.
#[derive(Debug)]
pub struct MeteredStream<S> {
    inner: S,
    meter: Arc<Meter>,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            meter: Arc::new(Meter::default()),
        }
    }

    /// A handle onto this stream's counters.
    pub fn meter(&self) -> Arc<Meter> {
        Arc::clone(&self.meter)
    }

    pub fn bytes_read(&self) -> u64 {
        self.meter.bytes_read()
    }

    pub fn bytes_written(&self) -> u64 {
        self.meter.bytes_written()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap the inner stream. Outstanding [`Meter`] handles keep working.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for MeteredStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            this.meter.add_read(buf.filled().len() - before);
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for MeteredStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, data);
        if let Poll::Ready(Ok(n)) = poll {
            this.meter.add_written(n);
        }
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = poll {
            this.meter.add_written(n);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn counts_written_bytes_across_calls() {
        let (inner, mut peer) = tokio::io::duplex(1024);
        let mut stream = MeteredStream::new(inner);

        stream.write_all(b"hello").await.unwrap();
        stream.write_all(b"").await.unwrap();
        stream.write_all(b", world").await.unwrap();
        assert_eq!(stream.bytes_written(), 12);
        assert_eq!(stream.bytes_read(), 0);

        let mut buf = [0u8; 12];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello, world");
    }

    #[tokio::test]
    async fn zero_length_write_does_not_count() {
        let (inner, _peer) = tokio::io::duplex(16);
        let mut stream = MeteredStream::new(inner);
        let n = stream.write(&[]).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(stream.bytes_written(), 0);
    }

    #[tokio::test]
    async fn partial_writes_count_what_was_accepted() {
        // The duplex buffer only takes 4 bytes, so one poll_write is partial.
        let (inner, mut peer) = tokio::io::duplex(4);
        let mut stream = MeteredStream::new(inner);

        let n = poll_fn(|cx| Pin::new(&mut stream).poll_write(cx, b"0123456789"))
            .await
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(stream.bytes_written(), 4);

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0123");
    }

    #[tokio::test]
    async fn counts_read_bytes_and_not_eof() {
        let (inner, mut peer) = tokio::io::duplex(64);
        let mut stream = MeteredStream::new(inner);

        peer.write_all(b"abcdef").await.unwrap();
        peer.shutdown().await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdef");
        assert_eq!(stream.bytes_read(), 6);
    }

    #[tokio::test]
    async fn counters_are_monotonic_through_many_small_writes() {
        let (inner, mut peer) = tokio::io::duplex(8);
        let mut stream = MeteredStream::new(inner);
        let meter = stream.meter();

        let reader = tokio::spawn(async move {
            let mut sink = Vec::new();
            peer.read_to_end(&mut sink).await.unwrap();
            sink.len()
        });

        let mut last = 0;
        for chunk in [&b"a"[..], b"bc", b"", b"defghijklmnop", b"q"] {
            stream.write_all(chunk).await.unwrap();
            let now = meter.bytes_written();
            assert!(now >= last);
            last = now;
        }
        stream.shutdown().await.unwrap();
        drop(stream);

        assert_eq!(reader.await.unwrap(), 17);
        assert_eq!(meter.bytes_written(), 17);
    }

    #[tokio::test]
    async fn meter_outlives_the_stream() {
        let (inner, _peer) = tokio::io::duplex(64);
        let mut stream = MeteredStream::new(inner);
        let meter = stream.meter();
        stream.write_all(b"xyz").await.unwrap();

        let _inner = stream.into_inner();
        assert_eq!(meter.bytes_written(), 3);
    }

    #[tokio::test]
    async fn write_errors_are_passed_through_uncounted() {
        let (inner, peer) = tokio::io::duplex(64);
        drop(peer);
        let mut stream = MeteredStream::new(inner);

        let err = stream.write_all(b"lost").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(stream.bytes_written(), 0);
    }
}
