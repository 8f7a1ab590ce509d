//! klinesync-binance
//!
//! `CandleSource` backed by the Binance spot REST API (`GET /klines`).
//!
//! Status mapping:
//! - `429` and `418` become `SyncError::RateLimited`, carrying `Retry-After`.
//! - `400` with a Binance error payload becomes `SyncError::InvalidArg`
//!   (unknown symbol or interval); retrying cannot help.
//! - Any other non-success status or transport failure becomes `SyncError::Remote`.
//! - An empty body or `[]` is an empty batch.
#![warn(missing_docs)]

mod builder;

use std::time::Duration;

use async_trait::async_trait;
use klinesync_core::{CandleSource, Kline, KlineRequest, SourceConfig, SyncError};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde::de::IgnoredAny;
use url::Url;

pub use builder::BinanceSourceBuilder;

const NAME: &str = "binance";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Binance klines connector.
pub struct BinanceSource {
    client: reqwest::Client,
    klines_url: Url,
}

impl BinanceSource {
    /// Expert-only: construct an unwrapped connector for manual composition.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` if the base URL does not parse, and
    /// `SyncError::Remote` if the HTTP client cannot be built.
    pub fn new_raw(config: &SourceConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("klinesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
        Self::with_client(client, &config.base_url)
    }

    /// Use a preconfigured `reqwest::Client`.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` if `base_url` does not parse.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, SyncError> {
        let raw = format!("{}/klines", base_url.trim_end_matches('/'));
        let klines_url = Url::parse(&raw)
            .map_err(|e| SyncError::InvalidArg(format!("invalid candle API url {raw:?}: {e}")))?;
        Ok(Self { client, klines_url })
    }

    fn request_url(&self, req: &KlineRequest) -> Url {
        let mut url = self.klines_url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("symbol", req.instrument.as_str());
            q.append_pair("interval", req.resolution.as_str());
            if let Some(start) = req.start_time {
                q.append_pair("startTime", &start.to_string());
            }
            q.append_pair("limit", &req.limit.to_string());
        }
        url
    }
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// One row of the `/klines` response.
#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    IgnoredAny,
);

fn parse_num(field: &str, value: &str, open_time: i64) -> Result<f64, SyncError> {
    value.parse::<f64>().map_err(|_| {
        SyncError::Data(format!(
            "{NAME}: {field} {value:?} at {open_time} is not a number"
        ))
    })
}

impl TryFrom<RawKline> for Kline {
    type Error = SyncError;

    fn try_from(r: RawKline) -> Result<Self, Self::Error> {
        let t = r.0;
        Ok(Self {
            open_time: t,
            open: parse_num("open", &r.1, t)?,
            high: parse_num("high", &r.2, t)?,
            low: parse_num("low", &r.3, t)?,
            close: parse_num("close", &r.4, t)?,
            volume: parse_num("volume", &r.5, t)?,
            close_time: r.6,
            quote_volume: parse_num("quote_asset_volume", &r.7, t)?,
            trade_count: r.8,
            taker_buy_base_volume: parse_num("taker_buy_base_asset_volume", &r.9, t)?,
            taker_buy_quote_volume: parse_num("taker_buy_quote_asset_volume", &r.10, t)?,
        })
    }
}

/// Parse a `/klines` response body.
///
/// # Errors
/// Returns `SyncError::Data` if the body is not an array of kline rows or a
/// numeric field does not parse.
pub fn parse_klines(body: &[u8]) -> Result<Vec<Kline>, SyncError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let rows: Vec<RawKline> = serde_json::from_slice(body)
        .map_err(|e| SyncError::Data(format!("{NAME}: malformed klines payload: {e}")))?;
    rows.into_iter().map(Kline::try_from).collect()
}

fn retry_after_ms(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1_000))
}

#[async_trait]
impl CandleSource for BinanceSource {
    fn name(&self) -> &'static str {
        NAME
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "klinesync_binance::klines",
            skip(self, req),
            fields(
                instrument = %req.instrument,
                resolution = %req.resolution,
                start_time = ?req.start_time,
                limit = req.limit,
            ),
        )
    )]
    async fn klines(&self, req: &KlineRequest) -> Result<Vec<Kline>, SyncError> {
        let resp = self
            .client
            .get(self.request_url(req))
            .send()
            .await
            .map_err(|e| SyncError::remote(NAME, e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            return Err(SyncError::rate_limited(NAME, retry_after_ms(&resp)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::BAD_REQUEST {
                if let Ok(api) = serde_json::from_str::<ApiError>(&body) {
                    return Err(SyncError::InvalidArg(format!(
                        "{NAME} rejected {} {}: {} ({})",
                        req.instrument, req.resolution, api.msg, api.code
                    )));
                }
            }
            return Err(SyncError::remote(NAME, format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
        let rows = parse_klines(&body)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(rows = rows.len(), "klines batch received");
        Ok(rows)
    }
}
