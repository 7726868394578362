//! Arrow `RecordBatch` output for materialized results.

use std::sync::Arc;

use arrow_array::builder::{
    BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::Datelike;

use crate::cast::ColumnKind;
use crate::types::{Manifest, QueueryResult, Row, Value};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Offset timestamps are stored normalized to UTC.
const UTC: &str = "+00:00";

static NULL_CELL: Value = Value::Null;

/// Build a record batch with one nullable column per cell position.
///
/// Column types follow the manifest when `typed` is set, otherwise every
/// column is Utf8. Column names come from the manifest when it has them.
pub(crate) fn build_record_batch(
    rows: &[Row],
    manifest: Option<&Manifest>,
    typed: bool,
) -> QueueryResult<RecordBatch> {
    let width = manifest
        .map(Manifest::len)
        .unwrap_or_else(|| rows.iter().map(Vec::len).max().unwrap_or(0));

    let mut fields = Vec::with_capacity(width);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(width);

    for index in 0..width {
        let column = manifest.and_then(|m| m.schema.elements.get(index));
        let kind = match column {
            Some(c) if typed => Some(ColumnKind::from_type_tag(&c.column_type.base)?),
            _ => None,
        };
        let name = column
            .map(|c| c.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| index.to_string());

        let (data_type, array) = build_column(rows, index, kind);
        fields.push(Field::new(name, data_type, true));
        columns.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    if columns.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn build_column(rows: &[Row], index: usize, kind: Option<ColumnKind>) -> (DataType, ArrayRef) {
    let cells = rows.iter().map(|row| row.get(index).unwrap_or(&NULL_CELL));

    match kind {
        Some(ColumnKind::Integer) => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.as_i64());
            }
            (DataType::Int64, Arc::new(builder.finish()))
        }
        Some(ColumnKind::Float) => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.as_f64());
            }
            (DataType::Float64, Arc::new(builder.finish()))
        }
        Some(ColumnKind::Boolean) => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.as_bool());
            }
            (DataType::Boolean, Arc::new(builder.finish()))
        }
        Some(ColumnKind::Date) => {
            let mut builder = Date32Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(match cell {
                    Value::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
                    _ => None,
                });
            }
            (DataType::Date32, Arc::new(builder.finish()))
        }
        Some(ColumnKind::Timestamp) => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(timestamp_micros(cell));
            }
            (
                DataType::Timestamp(TimeUnit::Microsecond, None),
                Arc::new(builder.finish()),
            )
        }
        Some(ColumnKind::TimestampTz) => {
            let mut builder =
                TimestampMicrosecondBuilder::with_capacity(rows.len()).with_timezone(UTC);
            for cell in cells {
                builder.append_option(timestamp_micros(cell));
            }
            (
                DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
                Arc::new(builder.finish()),
            )
        }
        Some(ColumnKind::Text) | None => {
            let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 16);
            for cell in cells {
                match cell {
                    Value::Null => builder.append_null(),
                    other => builder.append_value(other.to_string()),
                }
            }
            (DataType::Utf8, Arc::new(builder.finish()))
        }
    }
}

/// Naive timestamps are read as UTC.
fn timestamp_micros(cell: &Value) -> Option<i64> {
    match cell {
        Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
        Value::TimestampTz(ts) => Some(ts.timestamp_micros()),
        _ => None,
    }
}
