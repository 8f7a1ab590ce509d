//! Instrument, resolution and series identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

const QUOTE_SUFFIX: &str = "USDT";

/// A tradable symbol such as `BTCUSDT`.
///
/// Symbols are normalized to uppercase and must be non-empty ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Instrument(String);

impl Instrument {
    /// Parse and normalize a symbol.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` when the symbol is empty or contains
    /// characters other than ASCII letters and digits.
    pub fn new(symbol: impl AsRef<str>) -> Result<Self, SyncError> {
        let s = symbol.as_ref().trim();
        if s.is_empty() {
            return Err(SyncError::InvalidArg("instrument symbol is empty".into()));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SyncError::InvalidArg(format!(
                "instrument symbol must be alphanumeric: {s:?}"
            )));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// Full symbol as sent to the candle API.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol with the quote suffix removed (`BTCUSDT` -> `BTC`), used in file names.
    #[must_use]
    pub fn short_name(&self) -> &str {
        match self.0.strip_suffix(QUOTE_SUFFIX) {
            Some(base) if !base.is_empty() => base,
            _ => &self.0,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Instrument {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Instrument {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Instrument> for String {
    fn from(value: Instrument) -> Self {
        value.0
    }
}

/// Sampling interval of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Resolution {
    /// One minute.
    #[serde(rename = "1m")]
    M1,
    /// Three minutes.
    #[serde(rename = "3m")]
    M3,
    /// Five minutes.
    #[serde(rename = "5m")]
    M5,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    M15,
    /// Thirty minutes.
    #[serde(rename = "30m")]
    M30,
    /// One hour.
    #[serde(rename = "1h")]
    H1,
    /// Two hours.
    #[serde(rename = "2h")]
    H2,
    /// Four hours.
    #[serde(rename = "4h")]
    H4,
    /// Six hours.
    #[serde(rename = "6h")]
    H6,
    /// Eight hours.
    #[serde(rename = "8h")]
    H8,
    /// Twelve hours.
    #[serde(rename = "12h")]
    H12,
    /// One day.
    #[serde(rename = "1d")]
    D1,
    /// Three days.
    #[serde(rename = "3d")]
    D3,
    /// One week.
    #[serde(rename = "1w")]
    W1,
}

impl Resolution {
    /// Every supported resolution, shortest first.
    pub const ALL: [Self; 14] = [
        Self::M1,
        Self::M3,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H6,
        Self::H8,
        Self::H12,
        Self::D1,
        Self::D3,
        Self::W1,
    ];

    /// Wire string used by the candle API and in file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
        }
    }

    /// Length of one candle in milliseconds.
    #[must_use]
    pub const fn duration_ms(self) -> i64 {
        const MIN: i64 = 60_000;
        match self {
            Self::M1 => MIN,
            Self::M3 => 3 * MIN,
            Self::M5 => 5 * MIN,
            Self::M15 => 15 * MIN,
            Self::M30 => 30 * MIN,
            Self::H1 => 60 * MIN,
            Self::H2 => 120 * MIN,
            Self::H4 => 240 * MIN,
            Self::H6 => 360 * MIN,
            Self::H8 => 480 * MIN,
            Self::H12 => 720 * MIN,
            Self::D1 => 1_440 * MIN,
            Self::D3 => 3 * 1_440 * MIN,
            Self::W1 => 7 * 1_440 * MIN,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| SyncError::InvalidArg(format!("unknown resolution: {s:?}")))
    }
}

/// Identity of one maintained series: an (instrument, resolution) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Instrument symbol.
    pub instrument: Instrument,
    /// Sampling interval.
    pub resolution: Resolution,
}

impl SeriesKey {
    /// Build a key from its parts.
    #[must_use]
    pub const fn new(instrument: Instrument, resolution: Resolution) -> Self {
        Self {
            instrument,
            resolution,
        }
    }

    /// Key used in the local cache index, e.g. `BTCUSDT_15m`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.instrument, self.resolution)
    }

    /// Artifact file name, e.g. `BTC_15m.parquet`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_{}.parquet", self.instrument.short_name(), self.resolution)
    }

    /// Path of the artifact inside the dataset repository.
    #[must_use]
    pub fn dataset_path(&self, prefix: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/{}", self.instrument, self.file_name())
        } else {
            format!("{prefix}/{}/{}", self.instrument, self.file_name())
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.instrument, self.resolution)
    }
}
