//! Configuration types shared by the orchestrator, middleware and connectors.
//!
//! Durations are plain millisecond integers so configs round-trip through JSON
//! without custom serializers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::instrument::{Instrument, Resolution};

/// 2017-08-01T00:00:00Z, the first day the default instruments traded.
pub const DEFAULT_START_TIME_MS: i64 = 1_501_545_600_000;

/// Default instrument universe.
pub const DEFAULT_INSTRUMENTS: [&str; 22] = [
    "AAVEUSDT", "ADAUSDT", "ALGOUSDT", "ARBUSDT", "ATOMUSDT", "AVAXUSDT", "BCHUSDT", "BNBUSDT",
    "BTCUSDT", "DOGEUSDT", "DOTUSDT", "ETCUSDT", "ETHUSDT", "FILUSDT", "LINKUSDT", "LTCUSDT",
    "MATICUSDT", "NEARUSDT", "OPUSDT", "SOLUSDT", "UNIUSDT", "XRPUSDT",
];

/// Retry behaviour applied to every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one (>= 1).
    pub max_attempts: u32,
    /// Fixed delay before retrying an ordinary transient failure.
    pub retry_delay_ms: u64,
    /// Base delay for rate-limit rejections; multiplied by the attempt number.
    pub rate_limit_base_ms: u64,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2_000,
            rate_limit_base_ms: 10_000,
            jitter_percent: 0,
        }
    }
}

/// Paginated full-history fetch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Epoch milliseconds at which a backfill starts.
    pub start_time_ms: i64,
    /// Maximum rows requested per page.
    pub page_limit: u32,
    /// Consecutive empty pages after which the walk stops.
    pub max_empty_batches: u32,
    /// Pause between successful pages.
    pub request_delay_ms: u64,
    /// Merge the fetched history into the stored series instead of replacing it.
    pub merge_existing: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            start_time_ms: DEFAULT_START_TIME_MS,
            page_limit: 1_000,
            max_empty_batches: 5,
            request_delay_ms: 200,
            merge_existing: true,
        }
    }
}

/// Incremental update parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Number of most recent rows requested per update.
    pub window_limit: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self { window_limit: 1_000 }
    }
}

/// Group rotation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Instruments per group (> 0).
    pub group_size: usize,
    /// Length of one scheduling slot.
    pub slot_duration_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            group_size: 10,
            slot_duration_ms: 3_600_000,
        }
    }
}

/// Upload batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum entries pushed per flush.
    pub batch_size: usize,
    /// Pause between consecutive file uploads or deletes.
    pub file_delay_ms: u64,
    /// Remove the local artifact once its upload is confirmed.
    pub cleanup_after_upload: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            file_delay_ms: 500,
            cleanup_after_upload: true,
        }
    }
}

/// Fixed-window call budget shared by every call against one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Calls allowed per window.
    pub limit: u64,
    /// Window length.
    pub window_ms: u64,
}

impl LimiterConfig {
    /// Budget for the public candle API.
    #[must_use]
    pub const fn candle_api() -> Self {
        Self {
            limit: 1_200,
            window_ms: 60_000,
        }
    }

    /// Budget for dataset store commits and downloads.
    #[must_use]
    pub const fn dataset_store() -> Self {
        Self {
            limit: 300,
            window_ms: 3_600_000,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::candle_api()
    }
}

/// Candle API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL including the API version path.
    pub base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com/api/v3".into(),
        }
    }
}

/// Dataset repository coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hub endpoint.
    pub endpoint: String,
    /// Dataset repository id, `owner/name`.
    pub repo_id: String,
    /// Branch or revision written to.
    pub revision: String,
    /// Directory inside the repository holding the series.
    pub path_prefix: String,
    /// Access token; never written back out.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".into(),
            repo_id: "zongowo111/v2-crypto-ohlcv-data".into(),
            revision: "main".into(),
            path_prefix: "klines".into(),
            token: None,
        }
    }
}

/// Top-level configuration for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Instrument universe, in scheduling order.
    pub instruments: Vec<Instrument>,
    /// Resolutions maintained per instrument.
    pub resolutions: Vec<Resolution>,
    /// Local directory holding staged artifacts and the cache index.
    pub cache_dir: PathBuf,
    /// Pairs fetched concurrently (1 = sequential).
    pub concurrency: usize,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Backfill settings.
    pub backfill: BackfillConfig,
    /// Incremental update settings.
    pub update: UpdateConfig,
    /// Group rotation settings.
    pub schedule: ScheduleConfig,
    /// Upload batching settings.
    pub upload: UploadConfig,
    /// Call budget for the candle API.
    pub source_limit: LimiterConfig,
    /// Call budget for the dataset store.
    pub store_limit: LimiterConfig,
    /// Candle API endpoint.
    pub source: SourceConfig,
    /// Dataset repository.
    pub store: StoreConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            instruments: DEFAULT_INSTRUMENTS
                .iter()
                .filter_map(|s| Instrument::new(s).ok())
                .collect(),
            resolutions: vec![Resolution::M15, Resolution::H1],
            cache_dir: PathBuf::from("data/cache"),
            concurrency: 1,
            retry: RetryConfig::default(),
            backfill: BackfillConfig::default(),
            update: UpdateConfig::default(),
            schedule: ScheduleConfig::default(),
            upload: UploadConfig::default(),
            source_limit: LimiterConfig::candle_api(),
            store_limit: LimiterConfig::dataset_store(),
            source: SourceConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
