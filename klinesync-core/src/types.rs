//! Observation and series model.

use serde::{Deserialize, Serialize};

use crate::SyncError;
use crate::timeseries::merge::dedup_last_wins;

/// One candle as returned by the candle API.
///
/// `open_time` is the ordering and deduplication key within a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// Candle open time, epoch milliseconds.
    pub open_time: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Base asset volume.
    pub volume: f64,
    /// Candle close time, epoch milliseconds.
    pub close_time: i64,
    /// Quote asset volume.
    pub quote_volume: f64,
    /// Number of trades.
    pub trade_count: u64,
    /// Taker buy base asset volume.
    pub taker_buy_base_volume: f64,
    /// Taker buy quote asset volume.
    pub taker_buy_quote_volume: f64,
}

/// An ordered, duplicate-free sequence of klines for one series.
///
/// The constructors guarantee strictly ascending `open_time`; there is no way
/// to obtain a `Series` that violates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    klines: Vec<Kline>,
}

impl Series {
    /// An empty series.
    #[must_use]
    pub const fn new() -> Self {
        Self { klines: Vec::new() }
    }

    /// Wrap rows that are already sorted and unique.
    ///
    /// # Errors
    /// Returns `SyncError::Validation` when `open_time` is not strictly ascending.
    pub fn from_sorted_unique(klines: Vec<Kline>) -> Result<Self, SyncError> {
        if let Some(w) = klines.windows(2).find(|w| w[0].open_time >= w[1].open_time) {
            return Err(SyncError::Validation(format!(
                "open_time not strictly ascending: {} then {}",
                w[0].open_time, w[1].open_time
            )));
        }
        Ok(Self { klines })
    }

    /// Caller guarantees strictly ascending `open_time` (e.g. `BTreeMap` values).
    pub(crate) const fn from_sorted_unique_unchecked(klines: Vec<Kline>) -> Self {
        Self { klines }
    }

    /// Sort rows by `open_time`, keeping the last row seen for each timestamp.
    #[must_use]
    pub fn from_unsorted(klines: Vec<Kline>) -> Self {
        Self {
            klines: dedup_last_wins(klines),
        }
    }

    /// Rows in ascending `open_time` order.
    #[must_use]
    pub fn klines(&self) -> &[Kline] {
        &self.klines
    }

    /// Consume the series and return its rows.
    #[must_use]
    pub fn into_klines(self) -> Vec<Kline> {
        self.klines
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.klines.len()
    }

    /// True if the series has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.klines.is_empty()
    }

    /// Earliest row.
    #[must_use]
    pub fn first(&self) -> Option<&Kline> {
        self.klines.first()
    }

    /// Latest row.
    #[must_use]
    pub fn last(&self) -> Option<&Kline> {
        self.klines.last()
    }

    /// Iterate rows in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Kline> {
        self.klines.iter()
    }
}

impl FromIterator<Kline> for Series {
    fn from_iter<I: IntoIterator<Item = Kline>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Kline;
    type IntoIter = std::slice::Iter<'a, Kline>;

    fn into_iter(self) -> Self::IntoIter {
        self.klines.iter()
    }
}

impl IntoIterator for Series {
    type Item = Kline;
    type IntoIter = std::vec::IntoIter<Kline>;

    fn into_iter(self) -> Self::IntoIter {
        self.klines.into_iter()
    }
}
