use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metadata key holding the logger category the event was submitted through.
pub const LOGGER_KEY: &str = "Logger";
/// Metadata key holding the flattened scope path, e.g. `"Outer / Inner"`.
pub const SCOPE_KEY: &str = "Scope";
/// Reserved metadata key for the error attached to an event.
pub const ERROR_KEY: &str = "Exception";

/// Separator placed between nested scope names.
pub const SCOPE_SEPARATOR: &str = " / ";

/// Severity scale, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
        }
    }

    /// Parse a level name, case-insensitively. Accepts the common short
    /// aliases (`info`, `warn`, `fatal`) as well.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "information" | "info" => Some(LogLevel::Information),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" | "fatal" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            LogLevel::Error
        } else if *level == tracing::Level::WARN {
            LogLevel::Warning
        } else if *level == tracing::Level::INFO {
            LogLevel::Information
        } else if *level == tracing::Level::DEBUG {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }
}

/// Snapshot of an error and its `source()` chain, taken when the event is
/// submitted so the envelope owns no borrowed error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorValue {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ErrorValue {
    pub fn capture(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut sources = Vec::new();
        let mut next = err.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }
        ErrorValue {
            message: err.to_string(),
            sources,
        }
    }
}

/// A structured metadata value whose JSON form is produced lazily, at
/// delivery time. Conversion may fail, e.g. for maps keyed by tuples.
pub trait StructuredValue: fmt::Debug + Send + Sync {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl<T> StructuredValue for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// One metadata value. Primitive variants always serialize; `Error` and
/// `Structured` are complex and are the ones stripped by the primitive-only
/// fallback.
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Error(ErrorValue),
    Structured(Arc<dyn StructuredValue>),
}

impl MetadataValue {
    /// Wrap any serializable value.
    pub fn structured<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        MetadataValue::Structured(Arc::new(value))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, MetadataValue::Error(_) | MetadataValue::Structured(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(match self {
            MetadataValue::Null => serde_json::Value::Null,
            MetadataValue::Bool(b) => serde_json::Value::from(*b),
            MetadataValue::I64(n) => serde_json::Value::from(*n),
            MetadataValue::U64(n) => serde_json::Value::from(*n),
            MetadataValue::F64(n) => serde_json::Value::from(*n),
            MetadataValue::String(s) => serde_json::Value::String(s.clone()),
            MetadataValue::Error(e) => serde_json::to_value(e)?,
            MetadataValue::Structured(v) => v.to_json()?,
        })
    }
}

impl PartialEq for MetadataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MetadataValue::Null, MetadataValue::Null) => true,
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a == b,
            (MetadataValue::I64(a), MetadataValue::I64(b)) => a == b,
            (MetadataValue::U64(a), MetadataValue::U64(b)) => a == b,
            (MetadataValue::F64(a), MetadataValue::F64(b)) => a == b,
            (MetadataValue::String(a), MetadataValue::String(b)) => a == b,
            (MetadataValue::Error(a), MetadataValue::Error(b)) => a == b,
            (MetadataValue::Structured(a), MetadataValue::Structured(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::I64(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::I64(value as i64)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::U64(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::F64(value)
    }
}

impl From<ErrorValue> for MetadataValue {
    fn from(value: ErrorValue) -> Self {
        MetadataValue::Error(value)
    }
}

/// One log occurrence. Built by the provider, enriched once before it is
/// queued, and only read afterwards.
#[derive(Debug, Clone)]
pub struct LogEnvelope {
    message: String,
    level: LogLevel,
    metadata: BTreeMap<String, MetadataValue>,
    timestamp: DateTime<Utc>,
}

impl LogEnvelope {
    /// Create an envelope stamped with the current time.
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        metadata: BTreeMap<String, MetadataValue>,
    ) -> Self {
        Self::with_timestamp(message, level, metadata, Utc::now())
    }

    pub fn with_timestamp(
        message: impl Into<String>,
        level: LogLevel,
        metadata: BTreeMap<String, MetadataValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        LogEnvelope {
            message: message.into(),
            level,
            metadata,
            timestamp,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// `yyyy-MM-ddTHH:mm:ss.fffffff+00:00`: seven fractional digits and an
/// explicit offset.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    format!(
        "{}.{:07}{}",
        ts.format("%Y-%m-%dT%H:%M:%S"),
        ts.timestamp_subsec_nanos() / 100,
        ts.format("%:z")
    )
}
