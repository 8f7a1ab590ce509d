use std::sync::Arc;

use klinesync_core::{Clock, DatasetStore, LimiterConfig, RetryConfig, StoreConfig, SyncError};
use klinesync_middleware::{RateLimiter, RetryPolicy, StoreBuilder};

use crate::HubStore;

/// Builder type alias specialized for hub stores.
pub type HubStoreBuilder = StoreBuilder;

impl HubStore {
    /// Returns an unconfigured builder around the raw store.
    ///
    /// # Errors
    /// Propagates [`HubStore::new_raw`] failures.
    pub fn builder(config: &StoreConfig) -> Result<HubStoreBuilder, SyncError> {
        let raw: Arc<dyn DatasetStore> = Arc::new(Self::new_raw(config)?);
        Ok(StoreBuilder::new(raw))
    }

    /// Returns a builder with the default retry policy and the hourly commit budget.
    ///
    /// # Errors
    /// Propagates [`HubStore::new_raw`] failures.
    pub fn rate_limited(
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(HubStoreBuilder, Arc<RateLimiter>), SyncError> {
        let limiter = Arc::new(RateLimiter::new(
            LimiterConfig::dataset_store(),
            Arc::clone(&clock),
        ));
        let builder = Self::builder(config)?
            .with_rate_limit(Arc::clone(&limiter))
            .with_retry(RetryPolicy::new(RetryConfig::default()), clock);
        Ok((builder, limiter))
    }
}
