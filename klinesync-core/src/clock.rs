//! Time source used by pipelines and retry policies.

use std::time::Duration;

use async_trait::async_trait;

/// Wall clock plus sleep, injectable so tests can count and skip delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Suspend the current task for `dur`.
    async fn sleep(&self, dur: Duration);
}

/// Real time: `chrono::Utc` for the wall clock and `tokio::time` for sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, dur: Duration) {
        if !dur.is_zero() {
            tokio::time::sleep(dur).await;
        }
    }
}
