//! Telemetry relay configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagelink_core::ConfigError;

/// One attribute of interest and how it is presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute name on the telemetry element.
    pub attribute: String,
    /// Display label.
    pub label: String,
    /// Display unit.
    #[serde(default)]
    pub unit: String,
}

impl AttributeSpec {
    /// Create an attribute spec.
    #[must_use]
    pub fn new(attribute: impl Into<String>, label: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            label: label.into(),
            unit: unit.into(),
        }
    }
}

/// Telemetry relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Base url of the relay; `/attributes` and `/value/{id}` hang off it.
    pub relay_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Attributes of interest, in display order.
    pub attributes: Vec<AttributeSpec>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        const CELSIUS: &str = "\u{b0}C";
        let attributes = vec![
            AttributeSpec::new("temperature", "Temp 01", CELSIUS),
            AttributeSpec::new("TemperatureSetpoint", "Temp 02", CELSIUS),
            AttributeSpec::new("PowerUsage", "Temp 03", CELSIUS),
            AttributeSpec::new("Current", "Temp 04", CELSIUS),
            AttributeSpec::new("internalCalculOutput", "Temp 05", ""),
            AttributeSpec::new("temp_06", "Temp 06", CELSIUS),
            AttributeSpec::new("temp_07", "Temp 07", CELSIUS),
            AttributeSpec::new("temp_08", "Temp 08", CELSIUS),
            AttributeSpec::new("temp_09", "Temp 09", CELSIUS),
            AttributeSpec::new("temp_10", "Temp 10", CELSIUS),
            AttributeSpec::new("temp_11", "Temp 11", CELSIUS),
        ];
        Self {
            relay_url: "http://localhost:3001/api/telemetry".to_string(),
            request_timeout_ms: 5000,
            attributes,
        }
    }
}

impl TelemetryConfig {
    /// Parse a JSON document, filling unspecified fields with defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Request timeout as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_attribute_order() {
        let config = TelemetryConfig::default();
        assert_eq!(config.attributes.len(), 11);
        assert_eq!(config.attributes[0].attribute, "temperature");
        assert_eq!(config.attributes[4].unit, "");
        assert_eq!(config.attributes[10].label, "Temp 11");
    }

    #[test]
    fn test_partial_override() {
        let config = TelemetryConfig::from_json_str(
            r#"{"relay_url": "http://relay:9000/api", "attributes": [{"attribute": "flow", "label": "Flow"}]}"#,
        )
        .unwrap();
        assert_eq!(config.relay_url, "http://relay:9000/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.attributes, vec![AttributeSpec::new("flow", "Flow", "")]);
    }
}
