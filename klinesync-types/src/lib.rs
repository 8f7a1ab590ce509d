//! Shared error, identity, configuration and report types for klinesync.
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod instrument;
mod reports;

pub use cache::{CacheEntry, CacheStats, CacheStatus};
pub use config::{
    BackfillConfig, DEFAULT_INSTRUMENTS, DEFAULT_START_TIME_MS, LimiterConfig, RetryConfig,
    ScheduleConfig, SourceConfig, StoreConfig, SyncConfig, UpdateConfig, UploadConfig,
};
pub use error::SyncError;
pub use instrument::{Instrument, Resolution, SeriesKey};
pub use reports::{
    DatasetInventory, FlushReport, PairReport, PurgeReport, RunMode, RunReport,
};
