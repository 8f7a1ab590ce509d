//! Staging and batched upload of series artifacts.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use klinesync_core::{
    CacheEntry, CacheStats, Clock, DatasetStore, FlushReport, Series, SeriesKey, SyncError,
    UploadConfig, encode_series,
};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheIndex;

/// Owns the cache index and pushes pending artifacts to the dataset store.
///
/// The index lock is only taken for synchronous bookkeeping and is never held
/// across an upload.
pub struct UploadBatcher {
    index: Mutex<CacheIndex>,
    store: Arc<dyn DatasetStore>,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
    path_prefix: String,
}

impl UploadBatcher {
    /// Batcher over an already opened index.
    pub fn new(
        index: CacheIndex,
        store: Arc<dyn DatasetStore>,
        clock: Arc<dyn Clock>,
        config: UploadConfig,
        path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            index: Mutex::new(index),
            store,
            clock,
            config,
            path_prefix: path_prefix.into(),
        }
    }

    /// Open the cache at `cache_dir` and build a batcher over it.
    ///
    /// # Errors
    /// Propagates [`CacheIndex::open`] failures.
    pub fn open(
        cache_dir: impl Into<PathBuf>,
        store: Arc<dyn DatasetStore>,
        clock: Arc<dyn Clock>,
        config: UploadConfig,
        path_prefix: impl Into<String>,
    ) -> Result<Self, SyncError> {
        Ok(Self::new(
            CacheIndex::open(cache_dir)?,
            store,
            clock,
            config,
            path_prefix,
        ))
    }

    fn index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Active upload configuration.
    #[must_use]
    pub const fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Dataset path of `key` under the configured prefix.
    #[must_use]
    pub fn dataset_path(&self, key: &SeriesKey) -> String {
        key.dataset_path(&self.path_prefix)
    }

    /// Encode `series` and record it as pending for `key`.
    ///
    /// The artifact is written with `tokio::fs` before the index lock is
    /// taken. If the index cannot be saved, the pair is left as it was and a
    /// newly written file is removed.
    ///
    /// # Errors
    /// Returns `SyncError::Data` if encoding fails and `SyncError::Io` if the
    /// artifact or index cannot be written.
    pub async fn stage(&self, key: &SeriesKey, series: &Series) -> Result<CacheEntry, SyncError> {
        let artifact = encode_series(series)?;
        let filepath = self.index().artifact_path(key);
        if let Some(dir) = filepath.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&filepath, &artifact).await?;
        let recorded = self.index().record(key, series.len());
        let entry = match recorded {
            Ok(entry) => entry,
            Err(err) => {
                let untracked = self.index().get(key).is_none();
                if untracked {
                    let _ = tokio::fs::remove_file(&filepath).await;
                }
                return Err(err);
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, rows = entry.rows, bytes = artifact.len(), "staged");
        Ok(entry)
    }

    /// Pending entries in index order.
    #[must_use]
    pub fn pending(&self) -> Vec<CacheEntry> {
        self.index().pending()
    }

    /// Counts over the cache index.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.index().stats()
    }

    /// Remove uploaded artifacts and their index records.
    ///
    /// # Errors
    /// Returns `SyncError::Io` on filesystem failures.
    pub fn cleanup(&self) -> Result<usize, SyncError> {
        self.index().cleanup_uploaded()
    }

    /// Upload up to `batch_size` pending entries.
    pub async fn flush(&self, batch_size: usize) -> FlushReport {
        self.flush_with_cancel(batch_size, &CancellationToken::new())
            .await
    }

    /// Upload up to `batch_size` pending entries, stopping early on `cancel`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync::batcher::flush", skip(self, cancel))
    )]
    pub async fn flush_with_cancel(
        &self,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> FlushReport {
        let batch: Vec<CacheEntry> = self
            .pending()
            .into_iter()
            .take(batch_size.max(1))
            .collect();
        self.push_batch(batch, cancel).await
    }

    /// Upload every entry pending right now, in consecutive batches of
    /// `batch_size`. Each entry is attempted at most once.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync::batcher::flush_all", skip(self, cancel))
    )]
    pub async fn flush_all(
        &self,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Vec<FlushReport> {
        let snapshot = self.pending();
        let mut reports = Vec::new();
        for (i, chunk) in snapshot.chunks(batch_size.max(1)).enumerate() {
            if i > 0 && !self.pause(cancel).await {
                reports.push(FlushReport {
                    cancelled: true,
                    ..FlushReport::default()
                });
                break;
            }
            let report = self.push_batch(chunk.to_vec(), cancel).await;
            let stop = report.cancelled;
            reports.push(report);
            if stop {
                break;
            }
        }
        reports
    }

    /// Sleep `file_delay`; false when cancelled first.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let delay = Duration::from_millis(self.config.file_delay_ms);
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = self.clock.sleep(delay) => true,
        }
    }

    async fn push_batch(&self, batch: Vec<CacheEntry>, cancel: &CancellationToken) -> FlushReport {
        let mut report = FlushReport::default();
        for (i, entry) in batch.into_iter().enumerate() {
            if cancel.is_cancelled() || (i > 0 && !self.pause(cancel).await) {
                report.cancelled = true;
                break;
            }
            let key = entry.key();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                res = self.push_entry(&entry) => Some(res),
            };
            match outcome {
                None => {
                    report.cancelled = true;
                    break;
                }
                Some(Ok(())) => report.uploaded.push(key),
                Some(Err(err)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(key = %key, error = %err, "upload failed, entry stays pending");
                    report.failed.push((key, err));
                }
            }
        }
        report
    }

    async fn push_entry(&self, entry: &CacheEntry) -> Result<(), SyncError> {
        let key = entry.key();
        let path = self.dataset_path(&key);
        let content = tokio::fs::read(&entry.filepath)
            .await
            .map(Bytes::from)
            .map_err(|e| SyncError::upload(&path, format!("reading staged artifact: {e}")))?;
        let message = commit_message(&key, self.clock.now_ms());
        self.store
            .upload(&path, content, &message)
            .await
            .map_err(|e| SyncError::upload(&path, e.to_string()))?;

        {
            let mut index = self.index();
            index.mark_uploaded(&key)?;
            if self.config.cleanup_after_upload {
                index.remove_artifact(&key)?;
            }
        }
        #[cfg(feature = "tracing")]
        tracing::info!(path = %path, rows = entry.rows, "uploaded");
        Ok(())
    }
}

/// Commit message for an artifact upload.
fn commit_message(key: &SeriesKey, now_ms: i64) -> String {
    let at = DateTime::<Utc>::from_timestamp_millis(now_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    format!("Update {} {} at {at}", key.instrument, key.resolution)
}
