//! Core data types for query results, manifests, and typed cells.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a query as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Any status string (or numeric code) the client does not recognize.
    Other(String),
}

impl QueryStatus {
    /// True once the service will not move the query any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStatus::Success | QueryStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Running => "running",
            QueryStatus::Success => "success",
            QueryStatus::Failed => "failed",
            QueryStatus::Other(s) => s,
        }
    }
}

impl From<&str> for QueryStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => QueryStatus::Pending,
            "running" => QueryStatus::Running,
            "success" => QueryStatus::Success,
            "failed" => QueryStatus::Failed,
            other => QueryStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for QueryStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QueryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStatus {
            Text(String),
            Code(i64),
        }

        Ok(match RawStatus::deserialize(deserializer)? {
            RawStatus::Text(s) => QueryStatus::from(s.as_str()),
            RawStatus::Code(code) => QueryStatus::Other(code.to_string()),
        })
    }
}

/// Identity, status, and result locations of a submitted query.
///
/// Built from the service's JSON response. Only the fields below are read;
/// anything else in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBody {
    id: u64,
    #[serde(default)]
    data_file_urls: Vec<String>,
    #[serde(default)]
    error: Option<String>,
    status: QueryStatus,
    #[serde(default)]
    manifest_file_url: Option<String>,
}

impl ResultBody {
    pub fn new(
        id: u64,
        data_file_urls: Vec<String>,
        error: Option<String>,
        status: QueryStatus,
        manifest_file_url: Option<String>,
    ) -> Self {
        Self {
            id,
            data_file_urls,
            error,
            status,
            manifest_file_url,
        }
    }

    /// Parse a service response payload.
    pub fn from_json(bytes: &[u8]) -> QueueryResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data_file_urls(&self) -> &[String] {
        &self.data_file_urls
    }

    /// Service-reported error message. Empty strings count as no error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    pub fn status(&self) -> &QueryStatus {
        &self.status
    }

    pub fn manifest_file_url(&self) -> Option<&str> {
        self.manifest_file_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Schema manifest published alongside the result shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema: ManifestSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ManifestMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSchema {
    pub elements: Vec<ColumnDescriptor>,
}

/// One column of the result schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnType {
    /// Type-tag such as `integer` or `timestamp with time zone`.
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMeta {
    #[serde(default)]
    pub record_count: Option<u64>,
}

impl Manifest {
    /// Build a manifest from `(name, type-tag)` pairs.
    pub fn from_columns<'a, I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let elements = columns
            .into_iter()
            .map(|(name, base)| ColumnDescriptor {
                name: name.to_string(),
                column_type: ColumnType {
                    base: base.to_string(),
                },
            })
            .collect();
        Self {
            schema: ManifestSchema { elements },
            meta: None,
        }
    }

    pub fn from_json(bytes: &[u8]) -> QueueryResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Number of columns in the schema.
    pub fn len(&self) -> usize {
        self.schema.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schema.elements.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.elements.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn column_types(&self) -> Vec<&str> {
        self.schema
            .elements
            .iter()
            .map(|e| e.column_type.base.as_str())
            .collect()
    }

    pub fn record_count(&self) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.record_count)
    }
}

/// A single cell after casting.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    /// Timestamp with no offset in the source text.
    Timestamp(NaiveDateTime),
    /// Timestamp that carried an explicit UTC offset.
    TimestampTz(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::TimestampTz(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f%:z")),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

/// A result row, positionally aligned to the manifest schema.
pub type Row = Vec<Value>;

/// Errors that can occur in the queuery client.
#[derive(thiserror::Error, Debug)]
pub enum QueueryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP {status} from {url}")]
    Transport { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected status code was returned: {0}")]
    Protocol(u16),

    #[error("Query {id} did not finish within {timeout_secs}s (raise the timeout to wait longer)")]
    Timeout { id: u64, timeout_secs: i64 },

    #[error("Row has {row_len} cells but the manifest schema has {schema_len} elements")]
    Validation { row_len: usize, schema_len: usize },

    #[error("Not supported data type: {0}")]
    UnsupportedType(String),

    #[error("Cannot cast {value:?} as {type_name}: {reason}")]
    InvalidValue {
        value: String,
        type_name: String,
        reason: String,
    },

    #[error("Query failed with status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    QueryFailed {
        status: QueryStatus,
        message: Option<String>,
    },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "arrow")]
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
}

/// Convenience result type.
pub type QueueryResult<T> = Result<T, QueueryError>;
