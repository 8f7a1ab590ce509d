//! Local cache index records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::instrument::{Instrument, Resolution, SeriesKey};

/// Upload state of a staged artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Written locally, not yet confirmed in the dataset store.
    #[serde(alias = "cached")]
    Pending,
    /// Confirmed in the dataset store.
    Uploaded,
}

/// One staged series artifact tracked by the cache index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Artifact file name, e.g. `BTC_15m.parquet`.
    pub filename: String,
    /// Instrument of the staged series.
    #[serde(alias = "symbol")]
    pub instrument: Instrument,
    /// Resolution of the staged series.
    #[serde(alias = "timeframe")]
    pub resolution: Resolution,
    /// Number of rows in the artifact.
    pub rows: usize,
    /// Upload state.
    pub status: CacheStatus,
    /// Location of the artifact on local disk.
    pub filepath: PathBuf,
}

impl CacheEntry {
    /// Series identity of this entry.
    #[must_use]
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.instrument.clone(), self.resolution)
    }

    /// True while the artifact still has to be pushed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == CacheStatus::Pending
    }
}

/// Aggregate view over the cache index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries waiting for upload.
    pub pending: usize,
    /// Entries already uploaded and not yet cleaned up.
    pub uploaded: usize,
    /// Rows across pending entries.
    pub pending_rows: usize,
    /// Bytes on disk across pending entries.
    pub pending_bytes: u64,
}

impl CacheStats {
    /// Total tracked entries.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.uploaded
    }
}
