//! Dataset-wide housekeeping: inventory and purge.

use std::collections::HashSet;
use std::time::Duration;

use klinesync_core::{DatasetInventory, PurgeReport, SyncError};
use tokio_util::sync::CancellationToken;

use crate::Syncer;

impl Syncer {
    /// Report which configured pairs have an artifact in the dataset store.
    ///
    /// # Errors
    /// Propagates listing failures.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync::inventory", skip(self))
    )]
    pub async fn inventory(&self) -> Result<DatasetInventory, SyncError> {
        let listed: HashSet<String> = self
            .store
            .list(&self.cfg.store.path_prefix)
            .await?
            .into_iter()
            .collect();
        let (present, missing) = self
            .all_pairs()
            .into_iter()
            .partition(|key| listed.contains(&self.batcher.dataset_path(key)));
        Ok(DatasetInventory { present, missing })
    }

    /// Delete every file under the dataset path, one commit per file.
    ///
    /// Individual delete failures are collected; the purge carries on with the
    /// remaining files. Stops early when `cancel` fires.
    ///
    /// # Errors
    /// Propagates listing failures.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync::purge", skip(self, cancel))
    )]
    pub async fn purge(&self, cancel: &CancellationToken) -> Result<PurgeReport, SyncError> {
        let paths = self.store.list(&self.cfg.store.path_prefix).await?;
        let delay = Duration::from_millis(self.cfg.upload.file_delay_ms);
        let mut report = PurgeReport::default();
        for (i, path) in paths.into_iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = self.clock.sleep(delay) => {}
                }
            }
            let message = format!("Delete {path}");
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                res = self.store.delete(&path, &message) => res,
            };
            match outcome {
                Ok(()) => report.deleted.push(path),
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(path = %path, error = %err, "delete failed");
                    report.failed.push((path, err));
                }
            }
        }
        Ok(report)
    }
}
