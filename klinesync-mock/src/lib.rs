//! Test doubles for klinesync: a deterministic candle source, an in-memory
//! dataset store and a manual clock.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use klinesync_core::{CandleSource, Kline, KlineRequest, SyncError};

mod clock;
pub mod fixtures;
mod store;

pub use clock::ManualClock;
pub use store::MockStore;

/// Scripted response consumed before falling back to the synthetic grid.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return these rows as-is.
    Return(Vec<Kline>),
    /// Fail with this error.
    Fail(SyncError),
    /// Never complete.
    Hang,
}

/// Candle source serving a synthetic, gap-aware grid.
///
/// A request returns the candles whose open time falls inside the window
/// `[start, start + limit * step)`, clipped to the listing range and minus any
/// gaps. Windows entirely before the listing, inside a gap, or after the last
/// candle come back empty. A request without a start time returns the
/// `limit` most recent candles before the end of the listing.
pub struct MockSource {
    listed_from: i64,
    listed_until: i64,
    gaps: Vec<(i64, i64)>,
    bias: f64,
    script: Mutex<VecDeque<MockBehavior>>,
    calls: Mutex<Vec<KlineRequest>>,
}

impl MockSource {
    /// Source whose candles open in `[listed_from, listed_until)`.
    #[must_use]
    pub fn new(listed_from: i64, listed_until: i64) -> Self {
        Self {
            listed_from,
            listed_until,
            gaps: Vec::new(),
            bias: 0.0,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Remove candles opening in `[from, until)`.
    #[must_use]
    pub fn with_gap(mut self, from: i64, until: i64) -> Self {
        self.gaps.push((from, until));
        self
    }

    /// Shift every generated price, so a later fetch differs from a stored one.
    #[must_use]
    pub const fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    /// Queue a scripted response for the next call.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn push(&self, behavior: MockBehavior) {
        self.script.lock().expect("mutex poisoned").push_back(behavior);
    }

    /// Requests received so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<KlineRequest> {
        self.calls.lock().expect("mutex poisoned").clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    fn in_gap(&self, t: i64) -> bool {
        self.gaps.iter().any(|(from, until)| t >= *from && t < *until)
    }

    fn generate(&self, req: &KlineRequest) -> Vec<Kline> {
        let step = req.resolution.duration_ms();
        let span = step.saturating_mul(i64::from(req.limit));
        let (start, end) = match req.start_time {
            Some(start) => (start, start.saturating_add(span)),
            None => (self.listed_until.saturating_sub(span), self.listed_until),
        };
        let first = fixtures::align_up(start.max(self.listed_from), step);
        let end = end.min(self.listed_until);
        (0..)
            .map(|i| first + i * step)
            .take_while(|t| *t < end)
            .filter(|t| !self.in_gap(*t))
            .map(|t| fixtures::kline_at(t, req.resolution, self.bias))
            .collect()
    }
}

#[async_trait]
impl CandleSource for MockSource {
    fn name(&self) -> &'static str {
        "mock-source"
    }

    async fn klines(&self, req: &KlineRequest) -> Result<Vec<Kline>, SyncError> {
        self.calls.lock().expect("mutex poisoned").push(req.clone());
        let scripted = self.script.lock().expect("mutex poisoned").pop_front();
        match scripted {
            Some(MockBehavior::Return(rows)) => Ok(rows),
            Some(MockBehavior::Fail(err)) => Err(err),
            Some(MockBehavior::Hang) => std::future::pending().await,
            None => Ok(self.generate(req)),
        }
    }
}
