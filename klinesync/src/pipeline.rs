//! Per-pair pipelines and whole runs.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use klinesync_core::{
    KlineRequest, PairReport, RunMode, RunReport, Series, SeriesKey, SyncError, decode_series,
    merge_series, validate_series,
};
use tokio_util::sync::CancellationToken;

use crate::Syncer;

impl Syncer {
    /// Fetch the stored series for `key`.
    ///
    /// `Ok(None)` means nothing is stored yet; an empty series is a valid stored state.
    ///
    /// # Errors
    /// Propagates store failures and `SyncError::Data`/`Validation` for
    /// artifacts that do not decode.
    pub async fn load_existing(&self, key: &SeriesKey) -> Result<Option<Series>, SyncError> {
        let path = self.batcher.dataset_path(key);
        self.store
            .download(&path)
            .await?
            .map(decode_series)
            .transpose()
    }

    /// Merge the latest window for `key` into the stored series and stage it.
    ///
    /// Returns the row count of the staged series.
    ///
    /// # Errors
    /// - `SyncError::NoData` when the latest window is empty.
    /// - Download, decode, validation and staging failures.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "klinesync::incremental_update",
            skip(self, key),
            fields(instrument = %key.instrument, resolution = %key.resolution),
        )
    )]
    pub async fn incremental_update(&self, key: &SeriesKey) -> Result<usize, SyncError> {
        let req = KlineRequest::latest(key, self.cfg.update.window_limit);
        let rows = self.source.klines(&req).await?;
        if rows.is_empty() {
            return Err(SyncError::no_data(key.to_string()));
        }
        let incoming = Series::from_unsorted(rows);
        let merged = match self.load_existing(key).await? {
            Some(existing) => merge_series(existing, &incoming),
            None => incoming,
        };
        self.stage(key, &merged).await
    }

    /// Reconstruct the full history of `key` and stage it, merged into the
    /// stored series when `merge_existing` is set.
    ///
    /// # Errors
    /// - `SyncError::NoData` when the walk found no rows.
    /// - Source, download, decode, validation and staging failures.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "klinesync::backfill",
            skip(self, key),
            fields(instrument = %key.instrument, resolution = %key.resolution),
        )
    )]
    pub async fn backfill(&self, key: &SeriesKey) -> Result<usize, SyncError> {
        let history = self
            .fetcher
            .fetch_all_history(key, self.cfg.backfill.start_time_ms)
            .await?;
        let series = if self.cfg.backfill.merge_existing {
            match self.load_existing(key).await? {
                Some(existing) => merge_series(existing, &history),
                None => history,
            }
        } else {
            history
        };
        self.stage(key, &series).await
    }

    async fn stage(&self, key: &SeriesKey, series: &Series) -> Result<usize, SyncError> {
        validate_series(series)?;
        self.batcher.stage(key, series).await?;
        Ok(series.len())
    }

    async fn run_pair(&self, mode: RunMode, key: &SeriesKey) -> Result<usize, SyncError> {
        match mode {
            RunMode::Backfill => self.backfill(key).await,
            RunMode::Incremental => self.incremental_update(key).await,
            RunMode::Flush => Err(SyncError::InvalidArg(
                "flush runs do not process pairs".into(),
            )),
        }
    }

    /// Process `keys` with the given pipeline, then upload everything pending.
    ///
    /// Behavior:
    /// - Pairs run with up to `concurrency` in flight; one pair's failure never
    ///   stops the others.
    /// - Staged pairs whose upload fails (or is cancelled) are reported as failed
    ///   and stay pending for the next run.
    /// - After `cancel` fires, unstarted pairs report `SyncError::Cancelled`.
    pub async fn process_pairs(
        &self,
        mode: RunMode,
        keys: Vec<SeriesKey>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport::new(mode);
        let concurrency = self.cfg.concurrency.max(1);
        report.pairs = stream::iter(keys)
            .map(|key| async move {
                let outcome = if cancel.is_cancelled() {
                    Err(SyncError::Cancelled)
                } else {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => Err(SyncError::Cancelled),
                        res = self.run_pair(mode, &key) => res,
                    }
                };
                #[cfg(feature = "tracing")]
                {
                    if let Err(e) = &outcome {
                        tracing::warn!(key = %key, error = %e, "pair failed");
                    }
                }
                PairReport { key, outcome }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        report.flushes = self
            .batcher
            .flush_all(self.cfg.upload.batch_size, cancel)
            .await;
        self.settle_uploads(&mut report);
        report
    }

    /// Flip staged pairs whose artifact did not reach the store.
    fn settle_uploads(&self, report: &mut RunReport) {
        let mut upload_errors: HashMap<String, SyncError> = report
            .flushes
            .iter()
            .flat_map(|f| f.failed.iter())
            .map(|(k, e)| (k.cache_key(), e.clone()))
            .collect();
        let still_pending: HashSet<String> = self
            .batcher
            .pending()
            .iter()
            .map(|e| e.key().cache_key())
            .collect();
        for pair in &mut report.pairs {
            if pair.outcome.is_err() {
                continue;
            }
            let cache_key = pair.key.cache_key();
            if still_pending.contains(&cache_key) {
                pair.outcome = Err(upload_errors
                    .remove(&cache_key)
                    .unwrap_or(SyncError::Cancelled));
            }
        }
    }

    /// Incremental update of every configured pair.
    pub async fn run_incremental(&self, cancel: &CancellationToken) -> RunReport {
        self.process_pairs(RunMode::Incremental, self.all_pairs(), cancel)
            .await
    }

    /// Full backfill of every configured pair.
    pub async fn run_backfill(&self, cancel: &CancellationToken) -> RunReport {
        self.process_pairs(RunMode::Backfill, self.all_pairs(), cancel)
            .await
    }

    /// Incremental update of the group serving `slot`.
    pub async fn run_slot(&self, slot: u64, cancel: &CancellationToken) -> RunReport {
        #[cfg(feature = "tracing")]
        tracing::info!(
            slot,
            group = ?crate::schedule::group_for_slot(slot, self.scheduler.total_groups()),
            "running slot"
        );
        self.process_pairs(RunMode::Incremental, self.pairs_for_slot(slot), cancel)
            .await
    }

    /// Upload whatever earlier runs left pending.
    pub async fn flush_pending(&self, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::new(RunMode::Flush);
        report.flushes = self
            .batcher
            .flush_all(self.cfg.upload.batch_size, cancel)
            .await;
        report
    }
}
