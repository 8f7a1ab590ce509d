use std::collections::BTreeMap;

use crate::types::{Kline, Series};

/// Sort rows by `open_time` and drop duplicates, keeping the last occurrence.
///
/// Rows later in the input overwrite earlier rows with the same timestamp.
#[must_use]
pub fn dedup_last_wins<I>(klines: I) -> Vec<Kline>
where
    I: IntoIterator<Item = Kline>,
{
    let mut map: BTreeMap<i64, Kline> = BTreeMap::new();
    for k in klines {
        map.insert(k.open_time, k);
    }
    map.into_values().collect()
}

/// Merge freshly fetched rows into an existing series.
///
/// - Both empty yields an empty series; one empty yields a copy of the other.
/// - On a shared `open_time` the row from `incoming` wins.
/// - The result is ascending and unique by `open_time`.
///
/// Merging is idempotent: `merge_series(merge_series(a, b), b) == merge_series(a, b)`.
#[must_use]
pub fn merge_series(existing: Series, incoming: &Series) -> Series {
    if incoming.is_empty() {
        return existing;
    }
    if existing.is_empty() {
        return incoming.clone();
    }
    let mut map: BTreeMap<i64, Kline> = existing
        .into_iter()
        .map(|k| (k.open_time, k))
        .collect();
    for k in incoming {
        map.insert(k.open_time, *k);
    }
    Series::from_sorted_unique_unchecked(map.into_values().collect())
}

/// Concatenate page batches in fetch order into one series.
///
/// Later batches win on overlapping timestamps, matching [`merge_series`].
#[must_use]
pub fn merge_batches<I>(batches: I) -> Series
where
    I: IntoIterator<Item = Vec<Kline>>,
{
    Series::from_unsorted(batches.into_iter().flatten().collect())
}
