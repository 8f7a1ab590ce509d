use httpmock::prelude::*;
use klinesync_binance::{BinanceSource, parse_klines};
use klinesync_core::{CandleSource, KlineRequest, Resolution, SourceConfig, SyncError};
use klinesync_mock::fixtures::key;

const ROWS: &str = r#"[
  [1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"],
  [1499644800000,"0.01577100","0.01600000","0.01500000","0.01590000","1000.00000000",1500249599999,"15.90000000",12,"500.00000000","7.95000000","0"]
]"#;

fn source(server: &MockServer) -> BinanceSource {
    BinanceSource::new_raw(&SourceConfig {
        base_url: server.url("/api/v3"),
    })
    .expect("source")
}

#[tokio::test]
async fn paged_request_sends_start_time_and_parses_rows() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/klines")
                .query_param("symbol", "BTCUSDT")
                .query_param("interval", "1w")
                .query_param("startTime", "1499040000000")
                .query_param("limit", "1000");
            then.status(200)
                .header("content-type", "application/json")
                .body(ROWS);
        })
        .await;

    let k = key("BTCUSDT", Resolution::W1);
    let rows = source(&server)
        .klines(&KlineRequest::starting_at(&k, 1_499_040_000_000, 1_000))
        .await
        .expect("klines");
    m.assert_async().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].open_time, 1_499_040_000_000);
    assert_eq!(rows[0].close_time, 1_499_644_799_999);
    assert_eq!(rows[0].trade_count, 308);
    assert!((rows[0].high - 0.8).abs() < 1e-12);
    assert!((rows[1].taker_buy_quote_volume - 7.95).abs() < 1e-12);
}

#[tokio::test]
async fn empty_array_and_empty_body_are_empty_batches() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines").query_param("symbol", "ETHUSDT");
            then.status(200).body("[]");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines").query_param("symbol", "SOLUSDT");
            then.status(200).body("");
        })
        .await;

    let src = source(&server);
    for sym in ["ETHUSDT", "SOLUSDT"] {
        let rows = src
            .klines(&KlineRequest::latest(&key(sym, Resolution::H1), 1_000))
            .await
            .expect("klines");
        assert!(rows.is_empty(), "{sym}");
    }
}

#[tokio::test]
async fn too_many_requests_is_rate_limited_with_retry_after() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines");
            then.status(429).header("Retry-After", "7");
        })
        .await;

    let err = source(&server)
        .klines(&KlineRequest::latest(&key("BTCUSDT", Resolution::M15), 10))
        .await
        .unwrap_err();
    assert_eq!(err, SyncError::rate_limited("binance", Some(7_000)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn ip_ban_is_rate_limited() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines");
            then.status(418);
        })
        .await;
    let err = source(&server)
        .klines(&KlineRequest::latest(&key("BTCUSDT", Resolution::M15), 10))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn server_errors_are_transient_and_bad_symbols_are_not() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines").query_param("symbol", "BTCUSDT");
            then.status(502).body("bad gateway");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/klines").query_param("symbol", "NOPEUSDT");
            then.status(400)
                .body(r#"{"code":-1121,"msg":"Invalid symbol."}"#);
        })
        .await;

    let src = source(&server);
    let err = src
        .klines(&KlineRequest::latest(&key("BTCUSDT", Resolution::H1), 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote { .. }));

    let err = src
        .klines(&KlineRequest::latest(&key("NOPEUSDT", Resolution::H1), 10))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidArg(ref m) if m.contains("Invalid symbol")));
    assert!(!err.is_retryable());
}

#[test]
fn malformed_rows_are_data_errors() {
    let short = br#"[[1499040000000,"1.0"]]"#;
    assert!(matches!(parse_klines(short), Err(SyncError::Data(_))));

    let not_a_number = br#"[[1,"x","1","1","1","1",2,"1",3,"1","1","0"]]"#;
    let err = parse_klines(not_a_number).unwrap_err();
    assert!(matches!(err, SyncError::Data(ref m) if m.contains("open")));

    assert!(parse_klines(b"  \n").unwrap().is_empty());
}

#[test]
fn bad_base_url_is_rejected() {
    let err = BinanceSource::new_raw(&SourceConfig {
        base_url: "not a url".into(),
    })
    .err()
    .expect("error");
    assert!(matches!(err, SyncError::InvalidArg(_)));
}
