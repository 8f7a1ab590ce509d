use klinesync_types::SyncError;

#[test]
fn only_remote_failures_are_retryable() {
    assert!(SyncError::remote("binance", "boom").is_retryable());
    assert!(SyncError::rate_limited("hub", Some(1_000)).is_retryable());
    assert!(SyncError::rate_limited("hub", None).is_rate_limited());

    for err in [
        SyncError::no_data("BTCUSDT 15m"),
        SyncError::Validation("bad".into()),
        SyncError::Data("bad".into()),
        SyncError::upload("klines/x", "nope"),
        SyncError::not_found("klines/x"),
        SyncError::Io("disk".into()),
        SyncError::InvalidArg("x".into()),
        SyncError::Cancelled,
    ] {
        assert!(!err.is_retryable(), "{err} should not be retryable");
    }
}

#[test]
fn retry_after_only_on_rate_limits() {
    assert_eq!(
        SyncError::rate_limited("binance", Some(30_000)).retry_after_ms(),
        Some(30_000)
    );
    assert_eq!(SyncError::remote("binance", "x").retry_after_ms(), None);
}

#[test]
fn errors_roundtrip_through_json() {
    let err = SyncError::upload("klines/BTCUSDT/BTC_1h.parquet", "503");
    let json = serde_json::to_string(&err).expect("serialize error");
    let de: SyncError = serde_json::from_str(&json).expect("deserialize error");
    assert_eq!(de, err);
    assert_eq!(
        de.to_string(),
        "upload of klines/BTCUSDT/BTC_1h.parquet failed: 503"
    );
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: SyncError = io.into();
    assert!(matches!(err, SyncError::Io(ref m) if m.contains("gone")));
}
