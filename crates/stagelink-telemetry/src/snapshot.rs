//! Telemetry snapshot types.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Placeholder shown in place of a value that could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// The relay answered the value request with a non-success status.
    Error,
    /// The value request failed outright or returned malformed data.
    Unavailable,
    /// The attribute is not advertised by the telemetry element.
    NotFound,
    /// The attribute listing itself failed.
    ConnectionFailed,
}

impl Sentinel {
    /// Display text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Unavailable => "N/A",
            Self::NotFound => "Not Found",
            Self::ConnectionFailed => "Connection Failed",
        }
    }
}

impl Serialize for Sentinel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A telemetry value as displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    /// Numeric reading, rounded to two decimals.
    Number(f64),
    /// Textual reading, passed through.
    Text(String),
    /// Any other JSON reading, passed through.
    Json(Value),
    /// Placeholder for a reading that could not be obtained.
    Sentinel(Sentinel),
}

impl TelemetryValue {
    /// Convert a raw relay value; numbers are rounded to two decimals.
    #[must_use]
    pub fn from_raw(raw: Value) -> Self {
        match raw {
            Value::Number(n) => n
                .as_f64()
                .map_or(Self::Json(Value::Number(n)), |v| Self::Number(round2(v))),
            Value::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }

    /// The sentinel, if this value is one.
    #[must_use]
    pub const fn sentinel(&self) -> Option<Sentinel> {
        match self {
            Self::Sentinel(s) => Some(*s),
            _ => None,
        }
    }
}

/// Round to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One labelled reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading {
    pub label: String,
    pub value: TelemetryValue,
    pub unit: String,
    pub timestamp: String,
}

/// The panel's telemetry state; replaced wholesale on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub readings: Vec<TelemetryReading>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TelemetrySnapshot {
    /// Copy of this snapshot marked as in flight, with the error cleared.
    #[must_use]
    pub fn loading(&self) -> Self {
        Self {
            readings: self.readings.clone(),
            is_loading: true,
            error: None,
            last_updated: self.last_updated,
        }
    }
}
