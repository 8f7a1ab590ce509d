//! Paginated history reconstruction.

use std::sync::Arc;
use std::time::Duration;

use klinesync_core::{
    BackfillConfig, CandleSource, Clock, KlineRequest, Series, SeriesKey, SyncError, merge_batches,
};

/// Cursor over the windowed candle API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Open time the next request starts at.
    pub cursor: i64,
    /// Maximum rows per request.
    pub limit: u32,
}

impl FetchWindow {
    /// Window starting at `cursor`.
    #[must_use]
    pub const fn new(cursor: i64, limit: u32) -> Self {
        Self { cursor, limit }
    }

    /// Move past a non-empty batch whose last row closed at `last_close_time`.
    ///
    /// Always advances by at least one `step`.
    pub fn advance_past(&mut self, last_close_time: i64, step: i64) {
        let next = last_close_time.saturating_add(1);
        self.cursor = if next > self.cursor {
            next
        } else {
            self.cursor.saturating_add(step)
        };
    }

    /// Skip the span an empty batch covered.
    pub fn skip_empty(&mut self, step: i64) {
        self.cursor = self
            .cursor
            .saturating_add(step.saturating_mul(i64::from(self.limit)));
    }
}

/// Walks the candle API from a start time up to now.
pub struct HistoryFetcher {
    source: Arc<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    config: BackfillConfig,
}

impl HistoryFetcher {
    /// Fetcher over `source`, sleeping and reading time through `clock`.
    #[must_use]
    pub fn new(source: Arc<dyn CandleSource>, clock: Arc<dyn Clock>, config: BackfillConfig) -> Self {
        Self {
            source,
            clock,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &BackfillConfig {
        &self.config
    }

    /// Reconstruct the full series for `key` from `start_time` up to now.
    ///
    /// `now` is read once at the start. A non-empty page moves the cursor past
    /// its last close time and resets the empty-run counter; an empty page
    /// skips `page_limit` steps ahead. The walk stops at `now` or after
    /// `max_empty_batches` consecutive empty pages, whichever comes first.
    ///
    /// # Errors
    /// Returns `SyncError::NoData` when no page held any rows, and propagates
    /// the first source error that survived the retry layer.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "klinesync::backfill::fetch_all_history",
            skip(self, key),
            fields(instrument = %key.instrument, resolution = %key.resolution),
            err,
        )
    )]
    pub async fn fetch_all_history(
        &self,
        key: &SeriesKey,
        start_time: i64,
    ) -> Result<Series, SyncError> {
        let now = self.clock.now_ms();
        let step = key.resolution.duration_ms();
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut window = FetchWindow::new(start_time, self.config.page_limit.max(1));
        let mut batches = Vec::new();
        let mut empty_run: u32 = 0;

        while window.cursor < now {
            let req = KlineRequest::starting_at(key, window.cursor, window.limit);
            let batch = self.source.klines(&req).await?;
            match batch.last().map(|k| k.close_time) {
                None => {
                    empty_run += 1;
                    #[cfg(feature = "tracing")]
                    tracing::debug!(cursor = window.cursor, empty_run, "empty page");
                    if empty_run >= self.config.max_empty_batches {
                        break;
                    }
                    window.skip_empty(step);
                }
                Some(last_close) => {
                    empty_run = 0;
                    #[cfg(feature = "tracing")]
                    tracing::debug!(cursor = window.cursor, rows = batch.len(), "page fetched");
                    window.advance_past(last_close, step);
                    batches.push(batch);
                    self.clock.sleep(delay).await;
                }
            }
        }

        if batches.is_empty() {
            return Err(SyncError::no_data(key.to_string()));
        }
        Ok(merge_batches(batches))
    }
}
