//! Time-series utilities shared by the fetch and update pipelines.
//!
//! - `merge`: combine series keyed by open time, later rows winning
//! - `validate`: shape and ordering checks run before upload
/// Merge and deduplication of kline series.
pub mod merge;
/// Pre-upload checks.
pub mod validate;
