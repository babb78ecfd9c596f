//! Session configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Asset;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one asset must be configured")]
    NoAssets,
    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the stream comes from; selects the initial loading presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    /// Managed stream; the host is still starting when the UI comes up.
    #[default]
    Stream,
    /// Locally launched host.
    Local,
}

impl StreamSource {
    /// Loading text shown before the host answers.
    #[must_use]
    pub const fn initial_loading_text(self) -> &'static str {
        match self {
            Self::Stream => "Waiting for stream to initialize",
            Self::Local => "Waiting for stream to begin",
        }
    }

    /// Whether the spinner is shown before the host answers.
    #[must_use]
    pub const fn initially_loading(self) -> bool {
        matches!(self, Self::Stream)
    }
}

/// Which selections open the telemetry panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryPolicy {
    /// Any picked object.
    #[default]
    AnyObject,
    /// Only objects picked while a given asset is viewed through a given camera.
    CameraView {
        /// Asset display name.
        asset: String,
        /// Camera prim path that must be active.
        camera: String,
        /// Optional prefix the picked object's path must start with.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path_prefix: Option<String>,
    },
}

impl TelemetryPolicy {
    /// Whether a pick of `object_path` qualifies for telemetry display.
    ///
    /// `camera` is the active camera prim, `None` for the free camera.
    #[must_use]
    pub fn qualifies(&self, asset_name: &str, camera: Option<&str>, object_path: &str) -> bool {
        match self {
            Self::AnyObject => true,
            Self::CameraView {
                asset,
                camera: wanted,
                path_prefix,
            } => {
                asset == asset_name
                    && camera == Some(wanted.as_str())
                    && path_prefix
                        .as_deref()
                        .is_none_or(|prefix| object_path.starts_with(prefix))
            }
        }
    }
}

/// What happens to the optimistic camera mode when the host rejects a switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFailurePolicy {
    /// Leave the optimistic mode in place.
    #[default]
    Keep,
    /// Restore the last mode the host confirmed.
    Rollback,
}

/// Session controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stream source mode.
    pub source: StreamSource,
    /// Selectable assets; the first is selected at startup.
    pub assets: Vec<Asset>,
    /// Prim queried for the root of the tree.
    pub root_prim_path: String,
    /// Type filters sent with every children request.
    pub child_filters: Vec<String>,
    /// Liveness poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Telemetry eligibility.
    pub telemetry_policy: TelemetryPolicy,
    /// Camera switch failure handling.
    pub camera_failure: CameraFailurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: StreamSource::default(),
            assets: vec![
                Asset::new("Sample 1", "./samples/stage01.usd"),
                Asset::new("Sample 2", "./samples/stage02.usd"),
            ],
            root_prim_path: "/World".to_string(),
            child_filters: vec!["USDGeom".to_string()],
            poll_interval_ms: 3000,
            telemetry_policy: TelemetryPolicy::default(),
            camera_failure: CameraFailurePolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), assets = config.assets.len(), "Loaded session config");
        Ok(config)
    }

    /// Check invariants the controller relies on.
    ///
    /// # Errors
    /// Returns error if no assets are configured or the poll interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::NoAssets);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = SessionConfig::from_json_str(
            r#"{"assets": [{"name": "Panel", "url": "C:/stages/panel.usd", "cameras": ["/World/Cam"]}]}"#,
        )
        .unwrap();
        assert_eq!(config.root_prim_path, "/World");
        assert_eq!(config.child_filters, vec!["USDGeom"]);
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.telemetry_policy, TelemetryPolicy::AnyObject);
        assert_eq!(config.camera_failure, CameraFailurePolicy::Keep);
        assert_eq!(config.assets[0].cameras, vec!["/World/Cam"]);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"assets": []}"#),
            Err(ConfigError::NoAssets)
        ));
        assert!(matches!(
            SessionConfig::from_json_str(r#"{"poll_interval_ms": 0}"#),
            Err(ConfigError::ZeroPollInterval)
        ));
        assert!(matches!(
            SessionConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_policy_parsing_and_evaluation() {
        let config = SessionConfig::from_json_str(
            r#"{
                "telemetry_policy": {"kind": "camera_view", "asset": "Panel", "camera": "/World/Cam", "path_prefix": "/World/Panel"},
                "camera_failure": "rollback"
            }"#,
        )
        .unwrap();
        let policy = &config.telemetry_policy;
        assert!(policy.qualifies("Panel", Some("/World/Cam"), "/World/Panel/Door"));
        assert!(!policy.qualifies("Panel", None, "/World/Panel/Door"));
        assert!(!policy.qualifies("Other", Some("/World/Cam"), "/World/Panel/Door"));
        assert!(!policy.qualifies("Panel", Some("/World/Cam"), "/World/Floor"));
        assert_eq!(config.camera_failure, CameraFailurePolicy::Rollback);

        assert!(TelemetryPolicy::AnyObject.qualifies("", None, "/anything"));
    }

    #[test]
    fn test_source_presentation() {
        assert!(StreamSource::Stream.initially_loading());
        assert!(!StreamSource::Local.initially_loading());
        assert_eq!(
            StreamSource::Local.initial_loading_text(),
            "Waiting for stream to begin"
        );
    }
}
