//! klinesync-middleware
//!
//! Retry and rate-limit wrappers for candle sources and dataset stores, and
//! the builder that stacks them.

mod builder;
mod limiter;
mod retry;

pub use crate::builder::{SourceBuilder, StackBuilder, StoreBuilder};
pub use crate::limiter::{
    RATE_LIMIT_LAYER, RateLimitMiddleware, RateLimitedSource, RateLimitedStore, RateLimiter,
};
pub use crate::retry::{RETRY_LAYER, RetryMiddleware, RetryPolicy, RetryingSource, RetryingStore};
