//! Core traits for the host message channel and the telemetry relay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Outbound half of the connection to the streaming host.
///
/// Frames are JSON envelope text. Inbound frames are delivered separately
/// to the session runtime; implementations only need to push outbound text.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send one envelope frame to the host.
    async fn send(&self, frame: String) -> Result<(), ChannelError>;
}

/// Relay error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay answered with a non-success status.
    #[error("Relay responded with status {0}")]
    Status(u16),
    /// The relay could not be reached.
    #[error("Relay unreachable: {0}")]
    Transport(String),
    /// The relay answered with something that is not the expected JSON.
    #[error("Malformed relay response: {0}")]
    Decode(String),
}

/// One attribute advertised by the telemetry source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRef {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "WebId")]
    pub web_id: String,
}

/// Response of the relay's attribute listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeList {
    #[serde(rename = "Items", default)]
    pub items: Vec<AttributeRef>,
}

/// Current value of one attribute as reported by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    #[serde(rename = "Value", default)]
    pub value: Value,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<String>,
}

/// Read-only access to the telemetry relay.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// List the attributes available on the telemetry element.
    async fn list_attributes(&self) -> Result<Vec<AttributeRef>, RelayError>;

    /// Fetch the current value of one attribute.
    async fn fetch_value(&self, web_id: &str) -> Result<AttributeValue, RelayError>;
}
