use crate::SyncError;
use crate::types::{Kline, Series};

/// Check a merged series before it is staged for upload.
///
/// Rejects empty series, rows whose `open_time` is not before `close_time`,
/// and rows carrying non-finite numbers. Ordering is already guaranteed by
/// [`Series`] and is not re-checked.
///
/// # Errors
/// Returns `SyncError::Validation` describing the first offending row.
pub fn validate_series(series: &Series) -> Result<(), SyncError> {
    if series.is_empty() {
        return Err(SyncError::Validation("series is empty".into()));
    }
    for k in series {
        if k.open_time >= k.close_time {
            return Err(SyncError::Validation(format!(
                "row at {} closes at {}, not after it opens",
                k.open_time, k.close_time
            )));
        }
        if !all_finite(k) {
            return Err(SyncError::Validation(format!(
                "row at {} carries a non-finite value",
                k.open_time
            )));
        }
    }
    Ok(())
}

fn all_finite(k: &Kline) -> bool {
    [
        k.open,
        k.high,
        k.low,
        k.close,
        k.volume,
        k.quote_volume,
        k.taker_buy_base_volume,
        k.taker_buy_quote_volume,
    ]
    .iter()
    .all(|v| v.is_finite())
}
