//! klinesync keeps per-instrument kline datasets in a remote dataset repository
//! up to date.
//!
//! Overview
//! - `HistoryFetcher` walks a windowed candle API from a start time to now.
//! - Incremental runs fetch the latest window, merge it into the stored series
//!   (fresh rows win) and validate the result.
//! - `GroupScheduler` spreads the instrument universe over hourly slots.
//! - `UploadBatcher` stages parquet artifacts in a local cache and pushes them in
//!   bounded batches; failed uploads stay pending for the next run.
//! - Every remote call goes through the retry and rate-limit layers of
//!   `klinesync-middleware`.
//!
//! Key behaviors and trade-offs
//! - One pair's failure never aborts the others; a `RunReport` carries the
//!   per-pair outcome and the per-batch flush results.
//! - Concurrency is opt-in (`SyncConfig::concurrency`); all pairs share one
//!   limiter per downstream service either way.
//! - Cancellation stops fetching and flushing between steps; staged artifacts
//!   stay pending.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use klinesync::Syncer;
//! use klinesync_binance::BinanceSource;
//! use klinesync_hub::HubStore;
//! use tokio_util::sync::CancellationToken;
//!
//! let cfg = klinesync_core::SyncConfig::default();
//! let syncer = Syncer::builder()
//!     .with_source(Arc::new(BinanceSource::new_raw(&cfg.source)?))
//!     .with_store(Arc::new(HubStore::new_raw(&cfg.store)?))
//!     .config(cfg)
//!     .build()?;
//!
//! let slot = syncer.current_slot();
//! let report = syncer.run_slot(slot, &CancellationToken::new()).await;
//! println!("{} ok, {} failed", report.succeeded(), report.failed());
//! ```
#![warn(missing_docs)]

mod backfill;
mod batcher;
mod cache;
mod core;
mod maintenance;
mod pipeline;
mod schedule;

pub use crate::backfill::{FetchWindow, HistoryFetcher};
pub use crate::batcher::UploadBatcher;
pub use crate::cache::{CacheIndex, INDEX_FILE};
pub use crate::core::{Syncer, SyncerBuilder};
pub use crate::schedule::{GroupScheduler, InstrumentGroup, group_for_slot, groups_of};

pub use klinesync_core::{
    CacheEntry, CacheStats, CacheStatus, DatasetInventory, FlushReport, PairReport, PurgeReport,
    RunMode, RunReport, SyncConfig, SyncError,
};
