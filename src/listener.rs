//! Listener decorator: every accepted connection comes back pre-wrapped.

use std::io;
use std::net::SocketAddr;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::config::ThrottleConfig;
use crate::stream::ThrottledStream;

/// The accept seam: anything that yields bidirectional byte streams.
///
/// Implemented by `tokio::net::TcpListener`, by the in-memory listener in
/// [`crate::mem`], and by [`ThrottledListener`] itself, so decorators stack.
/// Closing a listener is dropping it, with the delegate's own idempotence.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Connection type this listener produces.
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next inbound connection.
    ///
    /// Errors are the delegate's own (listener closed, accept timeout, ...)
    /// and must reach the caller unchanged.
    async fn accept(&self) -> io::Result<(Self::Conn, SocketAddr)>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Bandwidth-limiting listener decorator.
///
/// Holds the delegate plus two immutable ceilings in bytes/second (`0` =
/// unlimited). Ceilings are shared read-only configuration; every accepted
/// connection gets its own fresh pair of token buckets, so connections
/// never contend with each other for tokens.
///
/// ```rust,no_run
/// use bwlimit::{ThrottledListener, KIB, MIB};
/// use tokio::net::TcpListener;
///
/// async fn serve() -> std::io::Result<()> {
///     let tcp = TcpListener::bind("127.0.0.1:8080").await?;
///     let listener = ThrottledListener::new(tcp, 512 * KIB, 2 * MIB);
///     loop {
///         let (conn, peer) = listener.accept().await?;
///         // drive `conn` exactly like the raw TcpStream
///         let _ = (conn, peer);
///     }
/// }
/// ```
pub struct ThrottledListener<L> {
    inner: L,
    up: u64,
    down: u64,
}

impl<L> ThrottledListener<L> {
    /// Wrap `inner`, limiting each accepted connection to `up` bytes/second
    /// written and `down` bytes/second read. `0` disables a direction.
    pub fn new(inner: L, up: u64, down: u64) -> Self {
        Self { inner, up, down }
    }

    /// Build from an already-validated [`ThrottleConfig`].
    pub fn from_config(inner: L, config: &ThrottleConfig) -> Self {
        Self::new(inner, config.up, config.down)
    }

    /// Shared access to the delegate listener.
    pub fn get_ref(&self) -> &L {
        &self.inner
    }

    /// Unwrap, returning the delegate listener.
    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: Listener> ThrottledListener<L> {
    /// Accept from the delegate and wrap the connection with fresh buckets.
    pub async fn accept(&self) -> io::Result<(ThrottledStream<L::Conn>, SocketAddr)> {
        let (conn, peer) = self.inner.accept().await?;
        debug!(%peer, up = self.up, down = self.down, "accepted throttled connection");
        Ok((ThrottledStream::new(conn, self.up, self.down), peer))
    }

    /// Address of the delegate listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl<L: Listener> Listener for ThrottledListener<L> {
    type Conn = ThrottledStream<L::Conn>;

    async fn accept(&self) -> io::Result<(Self::Conn, SocketAddr)> {
        ThrottledListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        ThrottledListener::local_addr(self)
    }
}
