use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use bytes::Bytes;
use klinesync_core::{Kline, Series, SyncError, decode_series, encode_series};
use parquet::arrow::ArrowWriter;

fn kline(open_time: i64, close: f64) -> Kline {
    Kline {
        open_time,
        open: close - 1.0,
        high: close + 2.0,
        low: close - 2.0,
        close,
        volume: 12.5,
        close_time: open_time + 3_599_999,
        quote_volume: 12.5 * close,
        trade_count: 77,
        taker_buy_base_volume: 6.0,
        taker_buy_quote_volume: 6.0 * close,
    }
}

fn write_batch(batch: &RecordBatch) -> Bytes {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
    Bytes::from(buf)
}

#[test]
fn encoded_series_decodes_to_same_rows() {
    let series = Series::from_unsorted(vec![
        kline(1_700_000_000_000, 100.0),
        kline(1_700_003_600_000, 101.5),
        kline(1_700_007_200_000, 99.25),
    ]);
    let bytes = encode_series(&series).expect("encode");
    assert_eq!(&bytes[..4], b"PAR1");
    let decoded = decode_series(bytes).expect("decode");
    assert_eq!(decoded, series);
}

#[test]
fn empty_series_is_a_valid_artifact() {
    let bytes = encode_series(&Series::new()).expect("encode");
    assert!(decode_series(bytes).expect("decode").is_empty());
}

#[test]
fn nanosecond_timestamps_and_string_prices_are_accepted() {
    let open_ns: i64 = 1_600_000_000_000 * 1_000_000;
    let close_ns: i64 = (1_600_000_000_000 + 899_999) * 1_000_000;
    let ts = || DataType::Timestamp(TimeUnit::Nanosecond, None);
    let schema = Arc::new(Schema::new(vec![
        Field::new("open_time", ts(), false),
        Field::new("open", DataType::Utf8, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("close_time", ts(), false),
        Field::new("quote_asset_volume", DataType::Float64, false),
        Field::new("number_of_trades", DataType::Int64, false),
        Field::new("taker_buy_base_asset_volume", DataType::Float64, false),
        Field::new("taker_buy_quote_asset_volume", DataType::Float64, false),
        Field::new("ignore", DataType::Utf8, false),
    ]));
    let f = |v: f64| -> ArrayRef { Arc::new(Float64Array::from(vec![v])) };
    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampNanosecondArray::from(vec![open_ns])),
        Arc::new(StringArray::from(vec!["10.5"])),
        f(11.0),
        f(10.0),
        f(10.75),
        f(3.0),
        Arc::new(TimestampNanosecondArray::from(vec![close_ns])),
        f(32.0),
        Arc::new(Int64Array::from(vec![9])),
        f(1.0),
        f(10.0),
        Arc::new(StringArray::from(vec!["0"])),
    ];
    let batch = RecordBatch::try_new(schema, columns).unwrap();
    let decoded = decode_series(write_batch(&batch)).expect("decode");
    let k = decoded.klines()[0];
    assert_eq!(k.open_time, 1_600_000_000_000);
    assert_eq!(k.close_time, 1_600_000_899_999);
    assert!((k.open - 10.5).abs() < f64::EPSILON);
    assert_eq!(k.trade_count, 9);
}

#[test]
fn missing_columns_are_a_validation_error() {
    let schema = Arc::new(Schema::new(vec![Field::new("open_time", DataType::Int64, false)]));
    let batch =
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1_i64])) as ArrayRef])
            .unwrap();
    let err = decode_series(write_batch(&batch)).unwrap_err();
    assert!(matches!(err, SyncError::Validation(ref m) if m.contains("missing columns")));
}

#[test]
fn non_timestamp_open_time_is_rejected() {
    let names = [
        "open_time",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "close_time",
        "quote_asset_volume",
        "number_of_trades",
        "taker_buy_base_asset_volume",
        "taker_buy_quote_asset_volume",
    ];
    let schema = Arc::new(Schema::new(
        names
            .iter()
            .map(|n| Field::new(*n, DataType::Int64, false))
            .collect::<Vec<_>>(),
    ));
    let columns: Vec<ArrayRef> = names
        .iter()
        .map(|_| Arc::new(Int64Array::from(vec![1_i64])) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema, columns).unwrap();
    let err = decode_series(write_batch(&batch)).unwrap_err();
    assert!(matches!(err, SyncError::Validation(ref m) if m.contains("timestamp")));
}

#[test]
fn garbage_bytes_are_a_data_error() {
    let err = decode_series(Bytes::from_static(b"not a parquet file")).unwrap_err();
    assert!(matches!(err, SyncError::Data(_)));
}
