//! Flat exports of replayed samples for external reporting tools.
//!
//! Each top-level sample becomes one row. Response and request bodies are
//! reduced to their byte length, sub-results to a count, and assertions to
//! a failure count plus the first failure message.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit, TimestampMicrosecondType, UInt64Type};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::Serialize;

use crate::codec::csv::quote_field;
use crate::error::Result;
use crate::models::SampleResult;
use crate::storage;

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatSample {
    pub label: Option<String>,
    pub elapsed_ms: Option<u64>,
    pub success: Option<bool>,
    pub thread_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub data_type: Option<String>,
    pub response_bytes: Option<u64>,
    pub request_bytes: Option<u64>,
    pub assertion_failures: u64,
    pub failure_message: Option<String>,
    pub sub_results: u64,
}

impl From<&SampleResult> for FlatSample {
    fn from(sample: &SampleResult) -> Self {
        let base = sample.base.as_ref();
        let extra = sample.extra.as_ref();
        let failures: Vec<_> = sample.assertions.iter().filter(|a| a.failure).collect();
        Self {
            label: base.map(|b| b.label.clone()),
            elapsed_ms: base.map(|b| b.elapsed_ms),
            success: base.map(|b| b.success),
            thread_name: extra.map(|e| e.thread_name.clone()),
            timestamp: extra.map(|e| e.timestamp),
            response_code: extra.map(|e| e.response_code.clone()),
            response_message: extra.map(|e| e.response_message.clone()),
            data_type: extra.map(|e| e.data_type.clone()),
            response_bytes: sample.response_data.as_ref().map(|d| d.len() as u64),
            request_bytes: sample.request_data.as_ref().map(|d| d.len() as u64),
            assertion_failures: failures.len() as u64,
            failure_message: failures.iter().find_map(|a| a.message.clone()),
            sub_results: sample.sub_results.len() as u64,
        }
    }
}

const COLUMNS: [&str; 13] = [
    "label",
    "elapsed_ms",
    "success",
    "thread_name",
    "timestamp",
    "response_code",
    "response_message",
    "data_type",
    "response_bytes",
    "request_bytes",
    "assertion_failures",
    "failure_message",
    "sub_results",
];

pub fn flatten(samples: &[SampleResult]) -> Vec<FlatSample> {
    samples.iter().map(FlatSample::from).collect()
}

// ─── CSV / JSON ──────────────────────────────────────────────────────────────

/// Flat rows as CSV with a header line. Absent values are empty cells.
pub fn to_csv(samples: &[SampleResult]) -> String {
    fn cell(value: Option<String>) -> String {
        value.map(|v| quote_field(&v).into_owned()).unwrap_or_default()
    }

    let mut out = COLUMNS.join(",") + "\n";
    for row in flatten(samples) {
        let cells = [
            cell(row.label),
            cell(row.elapsed_ms.map(|v| v.to_string())),
            cell(row.success.map(|v| v.to_string())),
            cell(row.thread_name),
            cell(row.timestamp.map(|t| t.to_rfc3339())),
            cell(row.response_code),
            cell(row.response_message),
            cell(row.data_type),
            cell(row.response_bytes.map(|v| v.to_string())),
            cell(row.request_bytes.map(|v| v.to_string())),
            row.assertion_failures.to_string(),
            cell(row.failure_message),
            row.sub_results.to_string(),
        ];
        out += &(cells.join(",") + "\n");
    }
    out
}

/// Full sample trees as a pretty-printed JSON array.
pub fn to_json(samples: &[SampleResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(samples)?)
}

// ─── Parquet ─────────────────────────────────────────────────────────────────

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("label", DataType::Utf8, true),
        Field::new("elapsed_ms", DataType::UInt64, true),
        Field::new("success", DataType::Boolean, true),
        Field::new("thread_name", DataType::Utf8, true),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            true,
        ),
        Field::new("response_code", DataType::Utf8, true),
        Field::new("response_message", DataType::Utf8, true),
        Field::new("data_type", DataType::Utf8, true),
        Field::new("response_bytes", DataType::UInt64, true),
        Field::new("request_bytes", DataType::UInt64, true),
        Field::new("assertion_failures", DataType::UInt64, false),
        Field::new("failure_message", DataType::Utf8, true),
        Field::new("sub_results", DataType::UInt64, false),
    ])
}

pub fn samples_to_record_batch(samples: &[SampleResult]) -> Result<RecordBatch> {
    let rows = flatten(samples);

    fn text(rows: &[FlatSample], get: impl Fn(&FlatSample) -> Option<&str>) -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(get).collect::<Vec<_>>()))
    }
    fn uint(rows: &[FlatSample], get: impl Fn(&FlatSample) -> Option<u64>) -> ArrayRef {
        Arc::new(UInt64Array::from(rows.iter().map(get).collect::<Vec<_>>()))
    }

    let columns: Vec<ArrayRef> = vec![
        text(&rows, |r| r.label.as_deref()),
        uint(&rows, |r| r.elapsed_ms),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.success).collect::<Vec<_>>(),
        )),
        text(&rows, |r| r.thread_name.as_deref()),
        Arc::new(
            TimestampMicrosecondArray::from(
                rows.iter()
                    .map(|r| r.timestamp.map(|t| t.timestamp_micros()))
                    .collect::<Vec<_>>(),
            )
            .with_timezone_opt(Some("UTC".to_string())),
        ),
        text(&rows, |r| r.response_code.as_deref()),
        text(&rows, |r| r.response_message.as_deref()),
        text(&rows, |r| r.data_type.as_deref()),
        uint(&rows, |r| r.response_bytes),
        uint(&rows, |r| r.request_bytes),
        uint(&rows, |r| Some(r.assertion_failures)),
        text(&rows, |r| r.failure_message.as_deref()),
        uint(&rows, |r| Some(r.sub_results)),
    ];

    Ok(RecordBatch::try_new(Arc::new(schema()), columns)?)
}

pub fn write_parquet(path: &Path, samples: &[SampleResult]) -> Result<()> {
    storage::ensure_parent(path)?;
    let batch = samples_to_record_batch(samples)?;
    let file = fs::File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Reads a Parquet export back as JSON rows keyed by column name.
pub fn read_parquet(path: &Path) -> Result<Vec<HashMap<String, serde_json::Value>>> {
    let file = fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(record_batch_to_rows(&batch?));
    }
    Ok(rows)
}

fn record_batch_to_rows(batch: &RecordBatch) -> Vec<HashMap<String, serde_json::Value>> {
    let schema = batch.schema();
    let mut rows = vec![HashMap::new(); batch.num_rows()];

    for (field, col) in schema.fields().iter().zip(batch.columns()) {
        for (row_idx, row) in rows.iter_mut().enumerate() {
            let val = if col.is_null(row_idx) {
                serde_json::Value::Null
            } else {
                match field.data_type() {
                    DataType::Utf8 => serde_json::json!(col.as_string::<i32>().value(row_idx)),
                    DataType::UInt64 => {
                        serde_json::json!(col.as_primitive::<UInt64Type>().value(row_idx))
                    }
                    DataType::Boolean => serde_json::json!(col.as_boolean().value(row_idx)),
                    DataType::Timestamp(TimeUnit::Microsecond, _) => {
                        let micros = col
                            .as_primitive::<TimestampMicrosecondType>()
                            .value(row_idx);
                        let dt = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_default();
                        serde_json::json!(dt.to_rfc3339())
                    }
                    _ => serde_json::Value::Null,
                }
            };
            row.insert(field.name().clone(), val);
        }
    }
    rows
}
