//! Builder for composing connectors with middleware layers.
//!
//! # Middleware Ordering Convention
//!
//! Layers form an "onion" around the raw connector:
//!
//! ```text
//! Caller
//!     ↓
//! Retry (outermost: re-runs everything below it)
//!     ↓
//! RateLimit (takes a permit per attempt)
//!     ↓
//! Raw connector (makes the actual HTTP call)
//! ```
//!
//! The `layers` vector stores middleware outermost-first and is applied in
//! reverse during [`StackBuilder::build`]. `with_retry` always inserts at the
//! outermost position and `with_rate_limit` at the innermost, so every retry
//! attempt passes through the shared limiter regardless of call order.

use std::sync::Arc;

use klinesync_core::{CandleSource, Clock, DatasetStore, Middleware};

use crate::limiter::{RATE_LIMIT_LAYER, RateLimitMiddleware, RateLimiter};
use crate::retry::{RETRY_LAYER, RetryMiddleware, RetryPolicy};

/// Generic middleware builder for a source or store.
pub struct StackBuilder<T: ?Sized> {
    raw: Arc<T>,
    /// Middleware layers in outermost-first order.
    layers: Vec<Box<dyn Middleware<T>>>,
}

/// Builder for candle sources.
pub type SourceBuilder = StackBuilder<dyn CandleSource>;
/// Builder for dataset stores.
pub type StoreBuilder = StackBuilder<dyn DatasetStore>;

impl<T: ?Sized> StackBuilder<T> {
    /// Create a new builder from a raw, unwrapped connector.
    #[must_use]
    pub fn new(raw: Arc<T>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    /// Names of the configured layers, outermost first.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Configuration snapshot of every layer, outermost first.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.layers
                .iter()
                .map(|l| serde_json::json!({ "name": l.name(), "config": l.config_json() }))
                .collect(),
        )
    }

    /// Add an arbitrary layer at the outermost position, replacing one of the same name.
    #[must_use]
    pub fn with_layer(mut self, layer: Box<dyn Middleware<T>>) -> Self {
        let name = layer.name();
        self.layers.retain(|m| m.name() != name);
        self.layers.insert(0, layer);
        self
    }

    /// Remove a layer by name if present.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.layers.retain(|m| m.name() != name);
        self
    }

    /// Build the wrapped connector.
    ///
    /// With `layers = [Retry, RateLimit]` the result is `Retry(RateLimit(Raw))`.
    #[must_use]
    pub fn build(self) -> Arc<T> {
        let mut acc = self.raw;
        for layer in self.layers.into_iter().rev() {
            acc = layer.apply(acc);
        }
        acc
    }
}

impl<T: ?Sized> StackBuilder<T>
where
    RetryMiddleware: Middleware<T>,
    RateLimitMiddleware: Middleware<T>,
{
    /// Add or replace the retry layer at the outermost position.
    #[must_use]
    pub fn with_retry(self, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        self.with_layer(Box::new(RetryMiddleware::new(policy, clock)))
    }

    /// Add or replace the rate-limit layer at the innermost position.
    #[must_use]
    pub fn with_rate_limit(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.layers.retain(|m| m.name() != RATE_LIMIT_LAYER);
        self.layers.push(Box::new(RateLimitMiddleware::new(limiter)));
        self
    }

    /// Remove the retry layer if present.
    #[must_use]
    pub fn without_retry(self) -> Self {
        self.without(RETRY_LAYER)
    }
}
