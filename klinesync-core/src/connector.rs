use async_trait::async_trait;
use bytes::Bytes;

use crate::SyncError;
use klinesync_types::{Instrument, Resolution, SeriesKey};

/// One bounded request against the candle API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    /// Instrument symbol.
    pub instrument: Instrument,
    /// Candle interval.
    pub resolution: Resolution,
    /// First open time to return; `None` asks for the most recent window.
    pub start_time: Option<i64>,
    /// Maximum rows returned.
    pub limit: u32,
}

impl KlineRequest {
    /// Request the latest `limit` rows for a pair.
    #[must_use]
    pub fn latest(key: &SeriesKey, limit: u32) -> Self {
        Self {
            instrument: key.instrument.clone(),
            resolution: key.resolution,
            start_time: None,
            limit,
        }
    }

    /// Request up to `limit` rows opening at or after `start_time`.
    #[must_use]
    pub fn starting_at(key: &SeriesKey, start_time: i64, limit: u32) -> Self {
        Self {
            instrument: key.instrument.clone(),
            resolution: key.resolution,
            start_time: Some(start_time),
            limit,
        }
    }
}

/// A windowed, rate-limited candle API.
///
/// Implementations return rows as delivered; an empty vector means the window
/// held no candles and is not an error.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Stable name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Fetch one batch of candles.
    async fn klines(&self, req: &KlineRequest) -> Result<Vec<crate::Kline>, SyncError>;
}

/// A versioned object store addressed by file path.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Stable name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Fetch a file. `Ok(None)` means the path does not exist.
    async fn download(&self, path: &str) -> Result<Option<Bytes>, SyncError>;

    /// Create or replace a file in a single commit.
    async fn upload(&self, path: &str, content: Bytes, message: &str) -> Result<(), SyncError>;

    /// List file paths below `prefix`, recursively.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SyncError>;

    /// Remove a file in a single commit.
    async fn delete(&self, path: &str, message: &str) -> Result<(), SyncError>;
}
