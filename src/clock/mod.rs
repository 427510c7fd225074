//! Clock - injectable time source for adapter lifecycles.
//!
//! Retry backoff and the initialization timeout sleep through a [`Clock`]
//! instead of calling tokio directly, so the lifecycle state machine can be
//! driven in tests without real timers.
//!
//! ```text
//! AdapterCore::run_initialize
//!     │
//!     ├── timeout(clock, 15s, handshake)
//!     │
//!     └── rate limited → clock.sleep(2^n * 2000ms) → handshake again
//! ```
//!
//! - [`TokioClock`] - production clock (honours tokio's paused test clock too)
//! - `ManualClock` (unit tests only) - sleeps return after one yield and are
//!   recorded for inspection

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Recording clock. A sleep yields once and returns, so a timeout raced
/// against it fires on the handshake's second poll; only for handshakes
/// that finish in one poll.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Race `fut` against a clock sleep. The future is polled first, so one that
/// is already complete always wins.
pub async fn timeout<F: Future>(
    clock: &dyn Clock,
    limit: Duration,
    fut: F,
) -> Result<F::Output, Duration> {
    tokio::select! {
        biased;
        out = fut => Ok(out),
        _ = clock.sleep(limit) => Err(limit),
    }
}
