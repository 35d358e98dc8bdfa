//! In-memory listener over duplex pipes / 基于内存管道的监听器。
//!
//! Zero-network stand-in for a real listener, mainly for unit and
//! integration tests: `connect` hands back the client half of a
//! `tokio::io::duplex` pair and queues the server half for `accept`.
//! 零网络：`connect` 返回客户端半边，服务端半边排队等待 `accept`。
//! Do not use in production paths.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use async_trait::async_trait;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::{mpsc, Mutex};

use crate::listener::Listener;

/// Per-connection pipe buffer. Large enough that throttling, not the pipe,
/// is the bottleneck in tests.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Memory listener: every [`MemListener::connect`] yields one accepted
/// connection. Accept order is connect order.
pub struct MemListener {
    queue: Mutex<mpsc::Receiver<DuplexStream>>,
    connect_tx: mpsc::Sender<DuplexStream>,
    addr: SocketAddr,
}

impl MemListener {
    /// Listener with a synthetic loopback address.
    pub fn new() -> Self {
        let (connect_tx, queue) = mpsc::channel(16);
        Self {
            queue: Mutex::new(queue),
            connect_tx,
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        }
    }

    /// Open a new connection to this listener, returning the client half.
    pub async fn connect(&self) -> io::Result<DuplexStream> {
        let (client, server) = duplex(PIPE_CAPACITY);
        self.connect_tx
            .send(server)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mem listener closed"))?;
        Ok(client)
    }
}

impl Default for MemListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for MemListener {
    type Conn = DuplexStream;

    async fn accept(&self) -> io::Result<(DuplexStream, SocketAddr)> {
        let mut queue = self.queue.lock().await;
        match queue.recv().await {
            Some(conn) => Ok((conn, self.addr)),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mem listener closed",
            )),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
