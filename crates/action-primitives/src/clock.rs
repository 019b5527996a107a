//! Injectable time source for readiness polling, verification and backoff

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::Cancelled;

/// Monotonic clock with an awaitable sleep
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Real time backed by tokio
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual time: `sleep` advances the clock instantly and records the request
///
/// Lets retry schedules and readiness timeouts be exercised without waiting.
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Every duration passed to `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of all recorded sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.elapsed.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Sleep on `clock` unless `cancel` fires first
pub async fn sleep_or_cancel(
    clock: &dyn Clock,
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = clock.sleep(duration) => Ok(()),
    }
}
