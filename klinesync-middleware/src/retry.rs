//! Bounded retries for remote calls.
//!
//! Ordinary transient failures wait a fixed delay; rate-limit rejections wait
//! `rate_limit_base * attempt`, or the server's `Retry-After` when that is
//! longer. Non-remote errors are returned on the first attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use klinesync_core::{
    CandleSource, Clock, DatasetStore, Kline, KlineRequest, Middleware, RetryConfig, SyncError,
};
use rand::Rng;

/// Reusable retry policy; sleeping goes through the supplied [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(mut config: RetryConfig) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        config.jitter_percent = config.jitter_percent.min(100);
        Self { config }
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, err: &SyncError, attempt: u32) -> Duration {
        let base_ms = if err.is_rate_limited() {
            let escalated = self
                .config
                .rate_limit_base_ms
                .saturating_mul(u64::from(attempt));
            escalated.max(err.retry_after_ms().unwrap_or(0))
        } else {
            self.config.retry_delay_ms
        };
        Duration::from_millis(jitter(base_ms, self.config.jitter_percent))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    ///
    /// # Errors
    /// Returns the error of the final attempt.
    pub async fn run<T, F, Fut>(
        &self,
        clock: &dyn Clock,
        label: &str,
        mut op: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || attempt >= self.config.max_attempts => {
                    #[cfg(feature = "tracing")]
                    {
                        if err.is_retryable() {
                            tracing::warn!(label, attempt, error = %err, "giving up after retries");
                        }
                    }
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(&err, attempt);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        label,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        rate_limited = err.is_rate_limited(),
                        error = %err,
                        "remote call failed; retrying"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = (label, &err);
                    clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn jitter(base_ms: u64, jitter_percent: u8) -> u64 {
    if jitter_percent == 0 || base_ms == 0 {
        return base_ms;
    }
    let range = std::cmp::max(1, base_ms.saturating_mul(u64::from(jitter_percent)) / 100);
    base_ms + rand::rng().random_range(0..range)
}

/// Candle source that retries failed batches.
pub struct RetryingSource {
    inner: Arc<dyn CandleSource>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryingSource {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: Arc<dyn CandleSource>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            policy,
            clock,
        }
    }
}

#[async_trait]
impl CandleSource for RetryingSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn klines(&self, req: &KlineRequest) -> Result<Vec<Kline>, SyncError> {
        let inner = &self.inner;
        self.policy
            .run(self.clock.as_ref(), "klines", move || inner.klines(req))
            .await
    }
}

/// Dataset store whose calls are retried.
pub struct RetryingStore {
    inner: Arc<dyn DatasetStore>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryingStore {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: Arc<dyn DatasetStore>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            policy,
            clock,
        }
    }
}

#[async_trait]
impl DatasetStore for RetryingStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn download(&self, path: &str) -> Result<Option<Bytes>, SyncError> {
        let inner = &self.inner;
        self.policy
            .run(self.clock.as_ref(), "download", move || inner.download(path))
            .await
    }

    async fn upload(&self, path: &str, content: Bytes, message: &str) -> Result<(), SyncError> {
        let inner = &self.inner;
        self.policy
            .run(self.clock.as_ref(), "upload", move || {
                inner.upload(path, content.clone(), message)
            })
            .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        let inner = &self.inner;
        self.policy
            .run(self.clock.as_ref(), "list", move || inner.list(prefix))
            .await
    }

    async fn delete(&self, path: &str, message: &str) -> Result<(), SyncError> {
        let inner = &self.inner;
        self.policy
            .run(self.clock.as_ref(), "delete", move || inner.delete(path, message))
            .await
    }
}

/// Middleware config for constructing retry wrappers.
pub struct RetryMiddleware {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryMiddleware {
    /// Retry layer sleeping on `clock`.
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    fn describe(&self) -> serde_json::Value {
        let cfg = self.policy.config();
        serde_json::json!({
            "max_attempts": cfg.max_attempts,
            "retry_delay_ms": cfg.retry_delay_ms,
            "rate_limit_base_ms": cfg.rate_limit_base_ms,
            "jitter_percent": cfg.jitter_percent,
        })
    }
}

/// Layer name used by [`RetryMiddleware`].
pub const RETRY_LAYER: &str = "Retry";

impl Middleware<dyn CandleSource> for RetryMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn CandleSource>) -> Arc<dyn CandleSource> {
        Arc::new(RetryingSource::new(inner, self.policy, self.clock))
    }

    fn name(&self) -> &'static str {
        RETRY_LAYER
    }

    fn config_json(&self) -> serde_json::Value {
        self.describe()
    }
}

impl Middleware<dyn DatasetStore> for RetryMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn DatasetStore>) -> Arc<dyn DatasetStore> {
        Arc::new(RetryingStore::new(inner, self.policy, self.clock))
    }

    fn name(&self) -> &'static str {
        RETRY_LAYER
    }

    fn config_json(&self) -> serde_json::Value {
        self.describe()
    }
}
