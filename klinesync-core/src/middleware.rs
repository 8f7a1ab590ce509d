//! Middleware trait for wrapping sources and stores.

use std::sync::Arc;

/// Trait implemented by connector middleware layers.
///
/// A middleware consumes an inner connector (`T` is `dyn CandleSource` or
/// `dyn DatasetStore`) and returns a wrapped connector that augments its
/// behavior (retries, rate limiting).
pub trait Middleware<T: ?Sized>: Send + Sync {
    /// Apply this middleware to wrap an inner connector and return the wrapped connector.
    fn apply(self: Box<Self>, inner: Arc<T>) -> Arc<T>;

    /// Human-readable middleware name for introspection/logging.
    fn name(&self) -> &'static str;

    /// Opaque configuration snapshot for serialization/inspection.
    fn config_json(&self) -> serde_json::Value;
}
