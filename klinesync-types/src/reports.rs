//! Report envelopes produced by sync runs.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::instrument::SeriesKey;

/// Which pipeline produced a run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Full history reconstruction.
    Backfill,
    /// Latest-window merge.
    Incremental,
    /// Upload of previously staged artifacts only.
    Flush,
}

/// Outcome for one (instrument, resolution) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReport {
    /// Pair identity.
    pub key: SeriesKey,
    /// Row count of the series that was staged, or the failure.
    pub outcome: Result<usize, SyncError>,
}

impl PairReport {
    /// True when the pair was staged and, if flushed, uploaded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Result of one upload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Pairs confirmed in the dataset store.
    pub uploaded: Vec<SeriesKey>,
    /// Pairs whose upload failed; they stay pending.
    pub failed: Vec<(SeriesKey, SyncError)>,
    /// True when the batch stopped early because of cancellation.
    pub cancelled: bool,
}

impl FlushReport {
    /// Entries attempted in this batch.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }
}

/// Aggregate result of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Pipeline that ran.
    pub mode: RunMode,
    /// Per-pair outcomes in processing order.
    pub pairs: Vec<PairReport>,
    /// Upload batches in flush order.
    pub flushes: Vec<FlushReport>,
}

impl RunReport {
    /// Empty report for the given mode.
    #[must_use]
    pub const fn new(mode: RunMode) -> Self {
        Self {
            mode,
            pairs: Vec::new(),
            flushes: Vec::new(),
        }
    }

    /// Number of pairs that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.pairs.iter().filter(|p| p.is_success()).count()
    }

    /// Number of pairs that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.pairs.len() - self.succeeded()
    }

    /// True when no pair failed and no upload batch reported a failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.flushes.iter().all(|f| f.failed.is_empty())
    }
}

/// Which configured series exist in the dataset store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInventory {
    /// Pairs whose artifact is present.
    pub present: Vec<SeriesKey>,
    /// Pairs whose artifact is missing.
    pub missing: Vec<SeriesKey>,
}

/// Result of removing every artifact under the dataset path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Paths deleted.
    pub deleted: Vec<String>,
    /// Paths whose deletion failed.
    pub failed: Vec<(String, SyncError)>,
}
