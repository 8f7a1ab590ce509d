//! Deterministic kline fixtures.

use klinesync_core::{Instrument, Kline, Resolution, Series, SeriesKey};

/// Series key for a symbol and resolution.
///
/// # Panics
/// Panics if `symbol` is not a valid instrument symbol.
#[must_use]
pub fn key(symbol: &str, resolution: Resolution) -> SeriesKey {
    SeriesKey::new(
        Instrument::new(symbol).expect("fixture symbol"),
        resolution,
    )
}

/// A candle opening at `open_time`; prices drift with the slot index and `bias`.
#[must_use]
pub fn kline_at(open_time: i64, resolution: Resolution, bias: f64) -> Kline {
    let step = resolution.duration_ms();
    #[allow(clippy::cast_precision_loss)]
    let wave = (open_time / step).rem_euclid(50) as f64;
    let close = 100.0 + wave + bias;
    let volume = 10.0 + wave / 10.0;
    Kline {
        open_time,
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume,
        close_time: open_time + step - 1,
        quote_volume: volume * close,
        trade_count: u64::try_from((open_time / step).rem_euclid(1_000)).unwrap_or(0) + 1,
        taker_buy_base_volume: volume / 2.0,
        taker_buy_quote_volume: volume * close / 2.0,
    }
}

/// Every candle opening in `[from, until)` on the resolution grid.
#[must_use]
pub fn series_between(from: i64, until: i64, resolution: Resolution, bias: f64) -> Series {
    let step = resolution.duration_ms();
    let first = align_up(from, step);
    let klines = (0..)
        .map(|i| first + i * step)
        .take_while(|t| *t < until)
        .map(|t| kline_at(t, resolution, bias))
        .collect();
    Series::from_unsorted(klines)
}

/// Smallest multiple of `step` that is `>= t`.
#[must_use]
pub const fn align_up(t: i64, step: i64) -> i64 {
    let rem = t.rem_euclid(step);
    if rem == 0 { t } else { t + (step - rem) }
}
