//! Manifest-driven conversion of raw CSV cells into typed values.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

use crate::types::{Manifest, QueueryError, QueueryResult, Row, Value};

/// Raw boolean tokens that cast to `false`. Everything else is `true`.
pub const FALSE_VALUES: [&str; 7] = ["0", "f", "F", "false", "FALSE", "off", "OFF"];

/// Native kind a manifest type-tag maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    Timestamp,
    TimestampTz,
    Date,
    Boolean,
}

impl ColumnKind {
    /// Resolve a manifest type-tag.
    pub fn from_type_tag(tag: &str) -> QueueryResult<Self> {
        match tag {
            "smallint" | "integer" | "bigint" => Ok(ColumnKind::Integer),
            "numeric" | "double precision" => Ok(ColumnKind::Float),
            "character" | "character varying" => Ok(ColumnKind::Text),
            "timestamp without time zone" => Ok(ColumnKind::Timestamp),
            "timestamp with time zone" => Ok(ColumnKind::TimestampTz),
            "date" => Ok(ColumnKind::Date),
            "boolean" => Ok(ColumnKind::Boolean),
            other => Err(QueueryError::UnsupportedType(other.to_string())),
        }
    }
}

/// Cast every cell of `row` according to the manifest schema.
///
/// Fails without producing any output when the row length differs from
/// the schema length.
pub fn cast_row<S: AsRef<str>>(row: &[S], manifest: &Manifest) -> QueueryResult<Row> {
    if row.len() != manifest.len() {
        return Err(QueueryError::Validation {
            row_len: row.len(),
            schema_len: manifest.len(),
        });
    }

    row.iter()
        .zip(&manifest.schema.elements)
        .map(|(cell, column)| cast_value(cell.as_ref(), &column.column_type.base))
        .collect()
}

/// Cast a single raw cell declared with `type_tag`.
///
/// An empty cell is `Null` for every tag, including unsupported ones.
pub fn cast_value(raw: &str, type_tag: &str) -> QueueryResult<Value> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }

    let invalid = |reason: String| QueueryError::InvalidValue {
        value: raw.to_string(),
        type_name: type_tag.to_string(),
        reason,
    };

    match ColumnKind::from_type_tag(type_tag)? {
        ColumnKind::Integer => raw
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| invalid(e.to_string())),
        ColumnKind::Float => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| invalid(e.to_string())),
        ColumnKind::Text => Ok(Value::Text(raw.to_string())),
        // Both timestamp tags honor whatever the text carries.
        ColumnKind::Timestamp | ColumnKind::TimestampTz => {
            parse_timestamp(raw).map_err(invalid)
        }
        ColumnKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| invalid(e.to_string())),
        ColumnKind::Boolean => Ok(Value::Boolean(!FALSE_VALUES.contains(&raw))),
    }
}

/// Parse an ISO-8601 timestamp, keeping an embedded UTC offset if present.
fn parse_timestamp(raw: &str) -> Result<Value, String> {
    if raw.len() == 10 {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| e.to_string())?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or("invalid midnight")?;
        return Ok(Value::Timestamp(midnight));
    }

    let (local, offset) = split_offset(raw)?;
    let naive = parse_naive(local)?;

    match offset {
        None => Ok(Value::Timestamp(naive)),
        Some(offset) => {
            let dt: DateTime<FixedOffset> = offset
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| format!("ambiguous local time for offset {offset}"))?;
            Ok(Value::TimestampTz(dt))
        }
    }
}

fn parse_naive(local: &str) -> Result<NaiveDateTime, String> {
    let (Some(date), Some(time)) = (local.get(..10), local.get(11..)) else {
        return Err("missing time component".to_string());
    };
    // Accept either `T` or a space between date and time.
    let normalized = format!("{date}T{time}");
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M"))
        .map_err(|e| e.to_string())
}

/// Split `raw` into its local part and an optional offset suffix.
///
/// Offsets may be `Z`, `±HH`, `±HHMM`, or `±HH:MM`.
fn split_offset(raw: &str) -> Result<(&str, Option<FixedOffset>), String> {
    if let Some(local) = raw.strip_suffix('Z') {
        return Ok((local, FixedOffset::east_opt(0)));
    }

    // Only search the time portion so the date's dashes are not mistaken for a sign.
    let time_start = raw.get(..11).map(|_| 11).ok_or("truncated timestamp")?;
    let Some(pos) = raw[time_start..].rfind(['+', '-']).map(|p| p + time_start) else {
        return Ok((raw, None));
    };

    let (local, suffix) = raw.split_at(pos);
    let sign = if suffix.starts_with('-') { -1 } else { 1 };
    let digits: String = suffix[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid UTC offset {suffix:?}"));
    }

    let (hours, minutes) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(format!("invalid UTC offset {suffix:?}")),
    };
    let hours: i32 = hours.parse().map_err(|_| format!("invalid UTC offset {suffix:?}"))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid UTC offset {suffix:?}"))?;

    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("UTC offset out of range {suffix:?}"))?;
    Ok((local, Some(offset)))
}
