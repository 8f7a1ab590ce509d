use std::sync::Arc;

use klinesync_core::{CandleSource, Clock, LimiterConfig, RetryConfig, SourceConfig, SyncError};
use klinesync_middleware::{RateLimiter, RetryPolicy, SourceBuilder};

use crate::BinanceSource;

/// Builder type alias specialized for Binance sources.
pub type BinanceSourceBuilder = SourceBuilder;

impl BinanceSource {
    /// Returns an unconfigured builder around the raw connector.
    ///
    /// # Errors
    /// Propagates [`BinanceSource::new_raw`] failures.
    pub fn builder(config: &SourceConfig) -> Result<BinanceSourceBuilder, SyncError> {
        let raw: Arc<dyn CandleSource> = Arc::new(Self::new_raw(config)?);
        Ok(SourceBuilder::new(raw))
    }

    /// Returns a builder with the default retry policy and the public API budget.
    ///
    /// The limiter is returned so other connectors hitting the same API can share it.
    ///
    /// # Errors
    /// Propagates [`BinanceSource::new_raw`] failures.
    pub fn rate_limited(
        config: &SourceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(BinanceSourceBuilder, Arc<RateLimiter>), SyncError> {
        let limiter = Arc::new(RateLimiter::new(
            LimiterConfig::candle_api(),
            Arc::clone(&clock),
        ));
        let builder = Self::builder(config)?
            .with_rate_limit(Arc::clone(&limiter))
            .with_retry(RetryPolicy::new(RetryConfig::default()), clock);
        Ok((builder, limiter))
    }
}
