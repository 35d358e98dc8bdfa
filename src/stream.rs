//! Throttled stream decorator over any `AsyncRead + AsyncWrite` delegate.
//!
//! 对任意异步字节流的限速包装：写方向对应 upload，读方向对应 download，
//! 两个方向各持一个独立令牌桶，计量只发生在 `poll_read` / `poll_write`。

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::bucket::TokenBucket;

pin_project! {
    #[derive(Debug)]
    /// Wraps one delegate connection plus two token buckets (upload gates
    /// writes, download gates reads, both from the accepting side's view).
    ///
    /// Backpressure is the calling task pending inside `poll_read` /
    /// `poll_write`; no internal buffering, no background shaper. Dropping
    /// an in-flight read/write future (deadline fired, connection torn
    /// down) cancels the armed wait with it.
    ///
    /// 每条连接独享两个桶，连接之间、方向之间互不干扰。
    pub struct ThrottledStream<S> {
        #[pin]
        inner: S,
        up: TokenBucket,
        down: TokenBucket,
    }
}

impl<S> ThrottledStream<S> {
    /// Wrap `inner`, limiting writes to `up` and reads to `down` bytes per
    /// second. `0` means unlimited for that direction.
    pub fn new(inner: S, up: u64, down: u64) -> Self {
        Self {
            inner,
            up: TokenBucket::new(up),
            down: TokenBucket::new(down),
        }
    }

    /// Shared access to the delegate (address accessors, socket options).
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Exclusive access to the delegate.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap, discarding both buckets.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl ThrottledStream<TcpStream> {
    /// Local address of the delegate socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Peer address of the delegate socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}

impl<S: AsyncRead> AsyncRead for ThrottledStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let want = buf.remaining();
        if this.down.is_unlimited() || want == 0 {
            return this.inner.poll_read(cx, buf);
        }

        let grant = ready!(this.down.poll_acquire(cx, want));
        // 只读授权额度那么多；短读按实际字节计费
        let n = {
            let mut limited = ReadBuf::new(buf.initialize_unfilled_to(grant.min(want)));
            ready!(this.inner.poll_read(cx, &mut limited))?;
            limited.filled().len()
        };
        buf.advance(n);
        this.down.consume(n);
        #[cfg(feature = "metrics")]
        metrics::counter!("bwlimit_bytes_total", "dir" => "down").increment(n as u64);
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite> AsyncWrite for ThrottledStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if this.up.is_unlimited() || buf.is_empty() {
            return this.inner.poll_write(cx, buf);
        }

        let grant = ready!(this.up.poll_acquire(cx, buf.len()));
        match this.inner.poll_write(cx, &buf[..grant.min(buf.len())]) {
            Poll::Ready(Ok(n)) => {
                this.up.consume(n);
                #[cfg(feature = "metrics")]
                metrics::counter!("bwlimit_bytes_total", "dir" => "up").increment(n as u64);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn unlimited_both_ways_is_pass_through() {
        let (a, mut b) = duplex(256);
        let mut throttled = ThrottledStream::new(a, 0, 0);
        let start = Instant::now();

        throttled.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        b.write_all(b"world").await.unwrap();
        throttled.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_write_never_sleeps() {
        let (a, _b) = duplex(64);
        let mut throttled = ThrottledStream::new(a, 8, 8);
        let start = Instant::now();
        let n = throttled.write(&[]).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn short_delegate_read_reported_verbatim() {
        let (a, mut b) = duplex(256);
        let mut throttled = ThrottledStream::new(a, 0, 1024);

        b.write_all(b"abc").await.unwrap();
        // caller asks for far more than the delegate has buffered
        let mut buf = [0u8; 128];
        let n = throttled.read(&mut buf).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");

        // only 3 bytes were charged: the rest of the burst window is intact
        b.write_all(&[b'x'; 1021]).await.unwrap();
        let start = Instant::now();
        let mut rest = vec![0u8; 1021];
        throttled.read_exact(&mut rest).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
