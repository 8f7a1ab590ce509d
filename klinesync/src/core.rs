use std::path::PathBuf;
use std::sync::Arc;

use klinesync_core::{
    BackfillConfig, CandleSource, Clock, DatasetStore, Instrument, Resolution, RetryConfig,
    ScheduleConfig, SeriesKey, SyncConfig, SyncError, SystemClock, UpdateConfig, UploadConfig,
};
use klinesync_middleware::{RateLimiter, RetryPolicy, SourceBuilder, StoreBuilder};

use crate::backfill::HistoryFetcher;
use crate::batcher::UploadBatcher;
use crate::schedule::GroupScheduler;

/// Orchestrator that keeps the configured series in sync with the dataset store.
pub struct Syncer {
    pub(crate) source: Arc<dyn CandleSource>,
    pub(crate) store: Arc<dyn DatasetStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) fetcher: HistoryFetcher,
    pub(crate) scheduler: GroupScheduler,
    pub(crate) batcher: UploadBatcher,
    pub(crate) cfg: SyncConfig,
}

/// Builder for constructing a `Syncer` with custom configuration.
pub struct SyncerBuilder {
    source: Option<Arc<dyn CandleSource>>,
    store: Option<Arc<dyn DatasetStore>>,
    clock: Arc<dyn Clock>,
    cfg: SyncConfig,
    middleware: bool,
}

impl Default for SyncerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncerBuilder {
    /// Create a new builder with the default configuration.
    ///
    /// Behavior:
    /// - Starts without a source or store; both must be registered.
    /// - Uses the system clock.
    /// - Wraps both connectors in retry and rate-limit layers on `build()`
    ///   unless [`without_middleware`](Self::without_middleware) is called.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            clock: Arc::new(SystemClock),
            cfg: SyncConfig::default(),
            middleware: true,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: SyncConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Register the candle source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn CandleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Register the dataset store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DatasetStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `clock` for time, delays and limiter windows.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use the connectors exactly as registered.
    ///
    /// For callers that composed their own stacks, e.g. via `SourceBuilder`.
    #[must_use]
    pub const fn without_middleware(mut self) -> Self {
        self.middleware = false;
        self
    }

    /// Replace the instrument universe.
    #[must_use]
    pub fn instruments(mut self, instruments: Vec<Instrument>) -> Self {
        self.cfg.instruments = instruments;
        self
    }

    /// Replace the maintained resolutions.
    #[must_use]
    pub fn resolutions(mut self, resolutions: Vec<Resolution>) -> Self {
        self.cfg.resolutions = resolutions;
        self
    }

    /// Local directory for staged artifacts and the cache index.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cfg.cache_dir = dir.into();
        self
    }

    /// Pairs fetched concurrently; values below one mean sequential.
    #[must_use]
    pub const fn concurrency(mut self, n: usize) -> Self {
        self.cfg.concurrency = n;
        self
    }

    /// Retry policy applied to both connectors.
    #[must_use]
    pub const fn retry(mut self, cfg: RetryConfig) -> Self {
        self.cfg.retry = cfg;
        self
    }

    /// Backfill pagination settings.
    #[must_use]
    pub const fn backfill(mut self, cfg: BackfillConfig) -> Self {
        self.cfg.backfill = cfg;
        self
    }

    /// Incremental update settings.
    #[must_use]
    pub const fn update(mut self, cfg: UpdateConfig) -> Self {
        self.cfg.update = cfg;
        self
    }

    /// Group rotation settings.
    #[must_use]
    pub const fn schedule(mut self, cfg: ScheduleConfig) -> Self {
        self.cfg.schedule = cfg;
        self
    }

    /// Upload batching settings.
    #[must_use]
    pub const fn upload(mut self, cfg: UploadConfig) -> Self {
        self.cfg.upload = cfg;
        self
    }

    /// Build the `Syncer`.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` when no source or store is registered,
    /// the instrument or resolution list is empty, or the schedule is invalid;
    /// returns `SyncError::Io` if the cache directory cannot be opened.
    pub fn build(self) -> Result<Syncer, SyncError> {
        let Self {
            source,
            store,
            clock,
            cfg,
            middleware,
        } = self;
        let source =
            source.ok_or_else(|| SyncError::InvalidArg("no candle source registered".into()))?;
        let store =
            store.ok_or_else(|| SyncError::InvalidArg("no dataset store registered".into()))?;
        if cfg.instruments.is_empty() {
            return Err(SyncError::InvalidArg("instrument list is empty".into()));
        }
        if cfg.resolutions.is_empty() {
            return Err(SyncError::InvalidArg("resolution list is empty".into()));
        }

        let (source, store) = if middleware {
            let policy = RetryPolicy::new(cfg.retry);
            let source = SourceBuilder::new(source)
                .with_rate_limit(Arc::new(RateLimiter::new(
                    cfg.source_limit,
                    Arc::clone(&clock),
                )))
                .with_retry(policy, Arc::clone(&clock))
                .build();
            let store = StoreBuilder::new(store)
                .with_rate_limit(Arc::new(RateLimiter::new(
                    cfg.store_limit,
                    Arc::clone(&clock),
                )))
                .with_retry(policy, Arc::clone(&clock))
                .build();
            (source, store)
        } else {
            (source, store)
        };

        let scheduler = GroupScheduler::new(&cfg.instruments, &cfg.schedule)?;
        let fetcher = HistoryFetcher::new(Arc::clone(&source), Arc::clone(&clock), cfg.backfill);
        let batcher = UploadBatcher::open(
            cfg.cache_dir.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
            cfg.upload,
            cfg.store.path_prefix.clone(),
        )?;

        Ok(Syncer {
            source,
            store,
            clock,
            fetcher,
            scheduler,
            batcher,
            cfg,
        })
    }
}

impl Syncer {
    /// Start building a new `Syncer`.
    #[must_use]
    pub fn builder() -> SyncerBuilder {
        SyncerBuilder::new()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    /// Group rotation over the configured universe.
    #[must_use]
    pub const fn scheduler(&self) -> &GroupScheduler {
        &self.scheduler
    }

    /// Staging area and uploader.
    #[must_use]
    pub const fn batcher(&self) -> &UploadBatcher {
        &self.batcher
    }

    /// Paginated history fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &HistoryFetcher {
        &self.fetcher
    }

    /// Slot containing the current time.
    #[must_use]
    pub fn current_slot(&self) -> u64 {
        self.scheduler.slot_at(self.clock.now_ms())
    }

    /// Every configured (instrument, resolution) pair, instrument-major.
    #[must_use]
    pub fn all_pairs(&self) -> Vec<SeriesKey> {
        pairs_for(&self.cfg.instruments, &self.cfg.resolutions)
    }

    /// Pairs of the group serving `slot`.
    #[must_use]
    pub fn pairs_for_slot(&self, slot: u64) -> Vec<SeriesKey> {
        pairs_for(
            self.scheduler.instruments_for_slot(slot),
            &self.cfg.resolutions,
        )
    }
}

fn pairs_for(instruments: &[Instrument], resolutions: &[Resolution]) -> Vec<SeriesKey> {
    instruments
        .iter()
        .flat_map(|i| {
            resolutions
                .iter()
                .map(move |r| SeriesKey::new(i.clone(), *r))
        })
        .collect()
}
