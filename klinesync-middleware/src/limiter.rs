//! Shared fixed-window rate limiter and the wrappers that consult it.
//!
//! One limiter instance is shared by every call against a downstream
//! service, whatever task issues the call.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use klinesync_core::{
    CandleSource, Clock, DatasetStore, Kline, KlineRequest, LimiterConfig, Middleware, SyncError,
};

/// Fixed-window permit budget.
///
/// `limit` calls are allowed per `window_ms`; windows stay aligned to the
/// first call even across idle gaps. A zero limit or zero window disables
/// limiting.
pub struct RateLimiter {
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    runtime: Mutex<WindowRuntime>,
}

struct WindowRuntime {
    window_start_ms: Option<i64>,
    calls_in_window: u64,
}

impl RateLimiter {
    /// Create a limiter reading time from `clock`.
    pub fn new(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            runtime: Mutex::new(WindowRuntime {
                window_start_ms: None,
                calls_in_window: 0,
            }),
        }
    }

    /// Configured budget.
    #[must_use]
    pub const fn config(&self) -> &LimiterConfig {
        &self.config
    }

    const fn is_disabled(&self) -> bool {
        self.config.limit == 0 || self.config.window_ms == 0
    }

    /// Take a permit if one is available, otherwise report the wait until the
    /// current window resets.
    ///
    /// # Errors
    /// Returns the time remaining in the current window when the budget is spent.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.is_disabled() {
            return Ok(());
        }
        let now = self.clock.now_ms();
        let window = i64::try_from(self.config.window_ms).unwrap_or(i64::MAX);
        let mut rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);

        let start = *rt.window_start_ms.get_or_insert(now);
        let elapsed = now.saturating_sub(start);
        if elapsed >= window {
            // Advance by whole windows so boundaries stay regular after idle gaps.
            let windows_passed = elapsed / window;
            rt.window_start_ms = Some(start + windows_passed * window);
            rt.calls_in_window = 0;
        }

        if rt.calls_in_window < self.config.limit {
            rt.calls_in_window += 1;
            return Ok(());
        }

        let start = rt.window_start_ms.unwrap_or(now);
        let remaining = (start + window).saturating_sub(now).max(1);
        drop(rt);
        Err(Duration::from_millis(u64::try_from(remaining).unwrap_or(1)))
    }

    /// Wait until a permit is available and take it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        limit = self.config.limit,
                        "rate limit budget spent; waiting for next window"
                    );
                    self.clock.sleep(wait).await;
                }
            }
        }
    }

    /// Permits left in the current window, as of the last call.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        let rt = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        self.config.limit.saturating_sub(rt.calls_in_window)
    }
}

/// Candle source that takes a permit before every batch request.
pub struct RateLimitedSource {
    inner: Arc<dyn CandleSource>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedSource {
    /// Wrap `inner`, sharing `limiter` with other wrappers of the same service.
    pub fn new(inner: Arc<dyn CandleSource>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl CandleSource for RateLimitedSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn klines(&self, req: &KlineRequest) -> Result<Vec<Kline>, SyncError> {
        self.limiter.acquire().await;
        self.inner.klines(req).await
    }
}

/// Dataset store that takes a permit before every call.
pub struct RateLimitedStore {
    inner: Arc<dyn DatasetStore>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedStore {
    /// Wrap `inner`, sharing `limiter` with other wrappers of the same service.
    pub fn new(inner: Arc<dyn DatasetStore>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl DatasetStore for RateLimitedStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn download(&self, path: &str) -> Result<Option<Bytes>, SyncError> {
        self.limiter.acquire().await;
        self.inner.download(path).await
    }

    async fn upload(&self, path: &str, content: Bytes, message: &str) -> Result<(), SyncError> {
        self.limiter.acquire().await;
        self.inner.upload(path, content, message).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        self.limiter.acquire().await;
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str, message: &str) -> Result<(), SyncError> {
        self.limiter.acquire().await;
        self.inner.delete(path, message).await
    }
}

/// Layer name used by [`RateLimitMiddleware`].
pub const RATE_LIMIT_LAYER: &str = "RateLimit";

/// Middleware config for constructing rate-limited wrappers.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Layer consulting a shared limiter.
    #[must_use]
    pub const fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    fn describe(&self) -> serde_json::Value {
        let cfg = self.limiter.config();
        serde_json::json!({
            "limit": cfg.limit,
            "window_ms": cfg.window_ms,
        })
    }
}

impl Middleware<dyn CandleSource> for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn CandleSource>) -> Arc<dyn CandleSource> {
        Arc::new(RateLimitedSource::new(inner, self.limiter))
    }

    fn name(&self) -> &'static str {
        RATE_LIMIT_LAYER
    }

    fn config_json(&self) -> serde_json::Value {
        self.describe()
    }
}

impl Middleware<dyn DatasetStore> for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn DatasetStore>) -> Arc<dyn DatasetStore> {
        Arc::new(RateLimitedStore::new(inner, self.limiter))
    }

    fn name(&self) -> &'static str {
        RATE_LIMIT_LAYER
    }

    fn config_json(&self) -> serde_json::Value {
        self.describe()
    }
}
