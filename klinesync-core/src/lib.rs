//! klinesync-core
//!
//! Core types, traits, and utilities shared across the klinesync workspace.
//!
//! - `types`: the `Kline` observation and the ordered `Series`.
//! - `connector`: the `CandleSource` and `DatasetStore` traits.
//! - `timeseries`: merge, deduplication and validation of series.
//! - `codec`: parquet encoding of series artifacts.
//! - `clock`: injectable wall clock and sleep.
//!
//! Async runtime (Tokio)
//! ---------------------
//! `SystemClock` sleeps with `tokio::time`, so pipelines built on it must run
//! under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Injectable time source.
pub mod clock;
/// Parquet encoding of series artifacts.
pub mod codec;
/// Candle source and dataset store traits.
pub mod connector;
/// Middleware trait implemented by connector wrappers.
pub mod middleware;
/// Time-series utilities for merging and validating series.
pub mod timeseries;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use codec::{decode_series, encode_series};
pub use connector::{CandleSource, DatasetStore, KlineRequest};
pub use klinesync_types::*;
pub use middleware::Middleware;
pub use timeseries::merge::{dedup_last_wins, merge_batches, merge_series};
pub use timeseries::validate::validate_series;
pub use types::{Kline, Series};
