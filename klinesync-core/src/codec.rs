//! Parquet encoding of kline series.
//!
//! Artifacts carry one column per kline field. Times are written as
//! millisecond timestamps; readers accept any timestamp unit and numeric
//! columns of any type that casts cleanly to the target type, so files written
//! by other tools stay readable.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, RecordBatch, TimestampMillisecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;

use crate::SyncError;
use crate::types::{Kline, Series};

/// Open time column; must be a timestamp column.
pub const OPEN_TIME: &str = "open_time";
/// Close time column.
pub const CLOSE_TIME: &str = "close_time";

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];
const QUOTE_VOLUME: &str = "quote_asset_volume";
const TRADES: &str = "number_of_trades";
const TAKER_BASE: &str = "taker_buy_base_asset_volume";
const TAKER_QUOTE: &str = "taker_buy_quote_asset_volume";

/// Columns every artifact must contain.
pub const REQUIRED_COLUMNS: [&str; 11] = [
    OPEN_TIME,
    "open",
    "high",
    "low",
    "close",
    "volume",
    CLOSE_TIME,
    QUOTE_VOLUME,
    TRADES,
    TAKER_BASE,
    TAKER_QUOTE,
];

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

/// Arrow schema written by [`encode_series`].
#[must_use]
pub fn kline_schema() -> Schema {
    Schema::new(vec![
        Field::new(OPEN_TIME, ts_type(), false),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new(CLOSE_TIME, ts_type(), false),
        Field::new(QUOTE_VOLUME, DataType::Float64, false),
        Field::new(TRADES, DataType::Int64, false),
        Field::new(TAKER_BASE, DataType::Float64, false),
        Field::new(TAKER_QUOTE, DataType::Float64, false),
    ])
}

fn arrow_err(e: &ArrowError) -> SyncError {
    SyncError::Data(format!("arrow: {e}"))
}

fn parquet_err(e: &ParquetError) -> SyncError {
    SyncError::Data(format!("parquet: {e}"))
}

fn f64_column(rows: &[Kline], f: impl Fn(&Kline) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
}

/// Encode a series as a snappy-compressed parquet file.
///
/// # Errors
/// Returns `SyncError::Data` if arrow or parquet reject the batch.
pub fn encode_series(series: &Series) -> Result<Bytes, SyncError> {
    let schema = Arc::new(kline_schema());
    let rows = series.klines();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMillisecondArray::from_iter_values(
            rows.iter().map(|k| k.open_time),
        )),
        f64_column(rows, |k| k.open),
        f64_column(rows, |k| k.high),
        f64_column(rows, |k| k.low),
        f64_column(rows, |k| k.close),
        f64_column(rows, |k| k.volume),
        Arc::new(TimestampMillisecondArray::from_iter_values(
            rows.iter().map(|k| k.close_time),
        )),
        f64_column(rows, |k| k.quote_volume),
        Arc::new(Int64Array::from_iter_values(
            rows.iter()
                .map(|k| i64::try_from(k.trade_count).unwrap_or(i64::MAX)),
        )),
        f64_column(rows, |k| k.taker_buy_base_volume),
        f64_column(rows, |k| k.taker_buy_quote_volume),
    ];
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns).map_err(|e| arrow_err(&e))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf: Vec<u8> = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buf, schema, Some(props)).map_err(|e| parquet_err(&e))?;
    writer.write(&batch).map_err(|e| parquet_err(&e))?;
    writer.close().map_err(|e| parquet_err(&e))?;
    Ok(Bytes::from(buf))
}

fn check_schema(schema: &Schema) -> Result<(), SyncError> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| schema.field_with_name(name).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(SyncError::Validation(format!(
            "missing columns: {}",
            missing.join(", ")
        )));
    }
    let open_type = schema
        .field_with_name(OPEN_TIME)
        .map_err(|e| arrow_err(&e))?
        .data_type();
    if !matches!(open_type, DataType::Timestamp(_, _)) {
        return Err(SyncError::Validation(format!(
            "{OPEN_TIME} must be a timestamp column, found {open_type}"
        )));
    }
    Ok(())
}

fn cast_column(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef, SyncError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| SyncError::Validation(format!("missing column {name}")))?;
    if col.null_count() > 0 {
        return Err(SyncError::Data(format!("column {name} contains nulls")));
    }
    let out = cast(col.as_ref(), to).map_err(|e| arrow_err(&e))?;
    // Safe casts turn unparsable values into nulls.
    if out.null_count() > 0 {
        return Err(SyncError::Data(format!(
            "column {name} has values that are not {to}"
        )));
    }
    Ok(out)
}

fn type_mismatch(name: &str) -> SyncError {
    SyncError::Data(format!("column {name} did not cast to the expected type"))
}

fn f64_values(batch: &RecordBatch, name: &str) -> Result<Vec<f64>, SyncError> {
    let col = cast_column(batch, name, &DataType::Float64)?;
    let arr = col
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| type_mismatch(name))?;
    Ok(arr.values().to_vec())
}

fn ts_values(batch: &RecordBatch, name: &str) -> Result<Vec<i64>, SyncError> {
    let col = cast_column(batch, name, &ts_type())?;
    let arr = col
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| type_mismatch(name))?;
    Ok(arr.values().to_vec())
}

fn i64_values(batch: &RecordBatch, name: &str) -> Result<Vec<i64>, SyncError> {
    let col = cast_column(batch, name, &DataType::Int64)?;
    let arr = col
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| type_mismatch(name))?;
    Ok(arr.values().to_vec())
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<Kline>) -> Result<(), SyncError> {
    let open_time = ts_values(batch, OPEN_TIME)?;
    let close_time = ts_values(batch, CLOSE_TIME)?;
    let [open, high, low, close, volume] = [
        f64_values(batch, PRICE_COLUMNS[0])?,
        f64_values(batch, PRICE_COLUMNS[1])?,
        f64_values(batch, PRICE_COLUMNS[2])?,
        f64_values(batch, PRICE_COLUMNS[3])?,
        f64_values(batch, PRICE_COLUMNS[4])?,
    ];
    let quote_volume = f64_values(batch, QUOTE_VOLUME)?;
    let trades = i64_values(batch, TRADES)?;
    let taker_base = f64_values(batch, TAKER_BASE)?;
    let taker_quote = f64_values(batch, TAKER_QUOTE)?;

    out.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        let trade_count = u64::try_from(trades[i])
            .map_err(|_| SyncError::Data(format!("negative trade count at row {i}")))?;
        out.push(Kline {
            open_time: open_time[i],
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i],
            close_time: close_time[i],
            quote_volume: quote_volume[i],
            trade_count,
            taker_buy_base_volume: taker_base[i],
            taker_buy_quote_volume: taker_quote[i],
        });
    }
    Ok(())
}

/// Decode a parquet artifact into a series.
///
/// Rows are re-sorted and deduplicated (last row wins), so artifacts written
/// out of order still produce a valid [`Series`].
///
/// # Errors
/// Returns `SyncError::Validation` if required columns are missing or
/// `open_time` is not a timestamp column, and `SyncError::Data` if the file
/// cannot be read or holds unusable values.
pub fn decode_series(data: Bytes) -> Result<Series, SyncError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data).map_err(|e| parquet_err(&e))?;
    check_schema(builder.schema())?;
    let reader = builder.build().map_err(|e| parquet_err(&e))?;
    let mut klines = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| arrow_err(&e))?;
        decode_batch(&batch, &mut klines)?;
    }
    Ok(Series::from_unsorted(klines))
}
