//! # bwlimit: Bandwidth-Limited Listener / 带宽限速监听器
//!
//! Decorators that cap per-connection upload and download throughput over
//! any tokio byte stream, and a listener wrapper that hands out
//! pre-throttled connections. Drop-in: callers keep the plain
//! accept/read/write/close contract and never see the metering.
//!
//! 对任意 tokio 字节流做上行/下行限速的装饰器，以及一个让每条接入连接
//! 自带限速的监听器包装。对调用方完全透明。
//!
//! ## Shape / 结构
//! - [`ThrottledListener`] wraps a delegate [`Listener`]; each `accept`
//!   returns a [`ThrottledStream`] with two fresh token buckets.
//!   每次 `accept` 都配一对全新令牌桶。
//! - Ceilings are bytes per second, `0` = unlimited. Burst is bounded by
//!   one second of tokens; long-run throughput never exceeds the ceiling.
//!   峰值最多一秒配额，长期平均不超配。
//! - No background tasks, no internal queues: waits happen inside the
//!   caller's own read/write future, so deadlines and connection teardown
//!   cancel them for free.
//!   没有后台线程，阻塞即背压。
//!
//! ## Example
//! ```rust,no_run
//! use bwlimit::{ThrottleConfig, ThrottledListener};
//! use tokio::net::TcpListener;
//!
//! async fn run() -> std::io::Result<()> {
//!     let config = ThrottleConfig::from_env().expect("BWLIMIT_* must be integers");
//!     let tcp = TcpListener::bind("127.0.0.1:4000").await?;
//!     let listener = ThrottledListener::from_config(tcp, &config);
//!     loop {
//!         let (conn, _peer) = listener.accept().await?;
//!         tokio::spawn(async move {
//!             // serve `conn` as usual; pacing is already in place
//!             let _ = conn;
//!         });
//!     }
//! }
//! ```

/// Token bucket and byte-unit constants
/// 令牌桶与字节单位常量
mod bucket;

/// Throttle configuration (validated integers only)
/// 限速配置（只接受已校验的整数）
pub mod config;

/// Listener trait and the throttling listener decorator
/// 监听器抽象与限速装饰器
pub mod listener;

/// In-memory duplex listener, mainly for testing
/// 内存双工监听器，主要用于测试
pub mod mem;

/// Throttled stream wrapper
/// 限速流包装器
pub mod stream;

pub use bucket::{GIB, KIB, MIB};
pub use config::{ConfigError, ThrottleConfig};
pub use listener::{Listener, ThrottledListener};
pub use mem::MemListener;
pub use stream::ThrottledStream;
