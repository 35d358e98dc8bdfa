//! 令牌桶：每连接每方向独享，懒惰补充，无后台任务。
//!
//! Lazy-refill token bucket, one per direction per connection. Refill is
//! computed from elapsed monotonic time on each acquire; waits are armed on
//! an owned timer so the caller's poll is the only scheduling unit.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};
use tracing::trace;

/// 1 KiB in bytes, for readable ceiling values.
pub const KIB: u64 = 1 << 10;
/// 1 MiB in bytes.
pub const MIB: u64 = 1 << 20;
/// 1 GiB in bytes.
pub const GIB: u64 = 1 << 30;

/// 桶容量固定为一秒的配额：空闲最多攒出一秒的突发，长期平均不超配。
///
/// `rate == 0` disables accounting entirely; `available` never exceeds
/// `capacity` and never goes negative, oversized requests are served as
/// repeated partial grants instead of debt.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    rate: u64,
    capacity: u64,
    available: u64,
    last_refill: Instant,
    sleep: Pin<Box<Sleep>>,
    waiting: bool,
}

impl TokenBucket {
    pub(crate) fn new(rate: u64) -> Self {
        Self {
            rate,
            capacity: rate,
            available: rate,
            last_refill: Instant::now(),
            sleep: Box::pin(sleep(Duration::ZERO)),
            waiting: false,
        }
    }

    #[inline]
    pub(crate) fn is_unlimited(&self) -> bool {
        self.rate == 0
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let accrued = (elapsed.as_nanos() * self.rate as u128 / 1_000_000_000)
            .min(self.capacity as u128) as u64;
        if accrued == 0 {
            // 时间片不足一个令牌，留到下次一起结算
            return;
        }
        self.last_refill = now;
        self.available = self.available.saturating_add(accrued).min(self.capacity);
    }

    /// How many of `want` bytes may flow now. `Pending` means the bucket is
    /// empty and the refill timer has been armed; tokens are only deducted
    /// later via [`TokenBucket::consume`], after actual I/O.
    pub(crate) fn poll_acquire(&mut self, cx: &mut Context<'_>, want: usize) -> Poll<usize> {
        if self.rate == 0 || want == 0 {
            return Poll::Ready(want);
        }
        loop {
            if self.waiting {
                ready!(self.sleep.as_mut().poll(cx));
                self.waiting = false;
            }
            self.refill();
            let grant = (want as u64).min(self.available) as usize;
            if grant > 0 {
                return Poll::Ready(grant);
            }
            // 等到整块（或一整桶）的令牌攒齐再醒，避免细碎唤醒
            let need = (want as u64).min(self.capacity);
            let nanos = need as u128 * 1_000_000_000 / self.rate as u128;
            let wait = Duration::from_nanos(nanos.max(1) as u64);
            trace!(want, need, wait_ms = wait.as_millis() as u64, "throttle wait armed");
            self.sleep.as_mut().reset(Instant::now() + wait);
            self.waiting = true;
        }
    }

    /// Deduct what the transport actually moved, never the requested size.
    #[inline]
    pub(crate) fn consume(&mut self, used: usize) {
        if self.rate == 0 {
            return;
        }
        self.available = self.available.saturating_sub(used as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;

    async fn acquire(bucket: &mut TokenBucket, want: usize) -> usize {
        poll_fn(|cx| bucket.poll_acquire(cx, want)).await
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_grants_any_size_without_sleep() {
        let mut b = TokenBucket::new(0);
        let start = Instant::now();
        assert_eq!(acquire(&mut b, usize::MAX).await, usize::MAX);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_bucket_grants_one_second_burst() {
        let mut b = TokenBucket::new(1000);
        let start = Instant::now();
        let grant = acquire(&mut b, 5000).await;
        assert_eq!(grant, 1000);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_waits_for_refill() {
        let mut b = TokenBucket::new(1000);
        let n = acquire(&mut b, 1000).await;
        b.consume(n);
        let start = Instant::now();
        let grant = acquire(&mut b, 500).await;
        assert_eq!(grant, 500);
        // 500 tokens at 1000 B/s is half a second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_bucket_caps_at_one_capacity() {
        let mut b = TokenBucket::new(100);
        tokio::time::sleep(Duration::from_secs(60)).await;
        let grant = acquire(&mut b, 10_000).await;
        assert_eq!(grant, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn consume_charges_only_actual_bytes() {
        let mut b = TokenBucket::new(100);
        let grant = acquire(&mut b, 100).await;
        assert_eq!(grant, 100);
        // short I/O: only 30 of the granted 100 bytes actually moved
        b.consume(30);
        assert_eq!(acquire(&mut b, 100).await, 70);
    }
}
