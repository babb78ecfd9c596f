//! Wire protocol for the streaming host.
//!
//! Every frame is a JSON envelope `{"event_type": ..., "payload": {...}}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown event type: {0}")]
    UnknownEvent(String),
    #[error("Invalid payload for {event_type}: {message}")]
    InvalidPayload { event_type: String, message: String },
}

/// Event types the host may send.
pub const INBOUND_EVENTS: &[&str] = &[
    "loadingStateResponse",
    "openedStageResult",
    "getChildrenResponse",
    "stageSelectionChanged",
    "updateProgressAmount",
    "updateProgressActivity",
    "switchCameraResponse",
];

/// Untyped envelope, as carried by the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Message from this client to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "camelCase")]
pub enum Outbound {
    /// Liveness probe; answered by `loadingStateResponse`.
    LoadingStateQuery {},
    /// Open a stage.
    OpenStageRequest { url: String },
    /// Request the children of a prim.
    GetChildrenRequest {
        prim_path: String,
        filters: Vec<String>,
    },
    /// Mark prims as selectable in the streamed view.
    MakePrimsPickable { paths: Vec<String> },
    /// Replace the host's selection.
    SelectPrimsRequest { paths: Vec<String> },
    /// Reset the stage to its state at load time.
    ResetStage {},
    /// Switch the active camera; an empty path means the free camera.
    SwitchCameraRequest { camera_path: String },
}

impl Outbound {
    /// Encode as an envelope frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame produced by [`Outbound::to_frame`].
    ///
    /// # Errors
    /// Returns error if the frame is not a known outbound envelope.
    pub fn from_frame(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// The envelope's event type.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::LoadingStateQuery {} => "loadingStateQuery",
            Self::OpenStageRequest { .. } => "openStageRequest",
            Self::GetChildrenRequest { .. } => "getChildrenRequest",
            Self::MakePrimsPickable { .. } => "makePrimsPickable",
            Self::SelectPrimsRequest { .. } => "selectPrimsRequest",
            Self::ResetStage {} => "resetStage",
            Self::SwitchCameraRequest { .. } => "switchCameraRequest",
        }
    }
}

/// Host load state reported in `loadingStateResponse`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostLoadState {
    /// Nothing in flight.
    Idle,
    /// Anything else the host reports.
    #[default]
    #[serde(other)]
    Busy,
}

/// Outcome field of host responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostResult {
    Success,
    #[serde(other)]
    Failure,
}

/// Message from the host to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "camelCase")]
pub enum Inbound {
    /// Liveness acknowledgment carrying the currently opened stage.
    LoadingStateResponse {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        loading_state: HostLoadState,
    },
    /// Result of an `openStageRequest`.
    OpenedStageResult {
        #[serde(default)]
        url: Option<String>,
        result: HostResult,
        #[serde(default)]
        error: Option<String>,
    },
    /// Children of a prim; `children` is left raw because the host sends
    /// non-array values for "no children".
    GetChildrenResponse {
        #[serde(default)]
        prim_path: Option<String>,
        #[serde(default)]
        children: Value,
    },
    /// Selection changed in the streamed viewport.
    StageSelectionChanged {
        #[serde(default)]
        prims: Value,
    },
    /// Numeric load progress.
    UpdateProgressAmount {
        #[serde(default)]
        amount: Option<f64>,
    },
    /// Load activity notification.
    UpdateProgressActivity {
        #[serde(default)]
        text: Option<String>,
    },
    /// Result of a `switchCameraRequest`.
    SwitchCameraResponse {
        #[serde(default)]
        camera_path: String,
        result: HostResult,
        #[serde(default)]
        error: Option<String>,
    },
}

impl Inbound {
    /// Decode an inbound frame.
    ///
    /// A missing or `null` payload is read as `{}`.
    ///
    /// # Errors
    /// Returns error on malformed JSON, an unknown event type, or a payload
    /// that does not match its event type.
    pub fn from_frame(frame: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        Self::from_envelope(envelope)
    }

    /// Decode an already-parsed envelope.
    ///
    /// # Errors
    /// See [`Inbound::from_frame`].
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope {
            event_type,
            payload,
        } = envelope;
        if !INBOUND_EVENTS.contains(&event_type.as_str()) {
            return Err(ProtocolError::UnknownEvent(event_type));
        }
        let payload = if payload.is_null() {
            Value::Object(Map::new())
        } else {
            payload
        };
        let tagged = serde_json::json!({ "event_type": event_type, "payload": payload });
        serde_json::from_value(tagged).map_err(|e| ProtocolError::InvalidPayload {
            event_type,
            message: e.to_string(),
        })
    }

    /// Encode as an envelope frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A prim as described by the host inside `getChildrenResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `None` when the key is absent; `Some` (possibly `null`) when present.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub children: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Interpret a `children` value: arrays yield their well-formed records,
/// anything else yields no records.
#[must_use]
pub fn parse_children(children: &Value) -> Vec<PrimRecord> {
    let Some(items) = children.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match PrimRecord::deserialize(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed prim record: {e}");
                None
            }
        })
        .collect()
}

/// Interpret a `prims` value as a list of paths; non-arrays are empty and
/// non-string entries are skipped.
#[must_use]
pub fn parse_paths(prims: &Value) -> Vec<String> {
    prims
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|p| p.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_outbound_envelope_shape() {
        let frame = Outbound::LoadingStateQuery {}.to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event_type": "loadingStateQuery", "payload": {}}));

        let frame = Outbound::GetChildrenRequest {
            prim_path: "/World".into(),
            filters: vec!["USDGeom".into()],
        }
        .to_frame()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "event_type": "getChildrenRequest",
                "payload": {"prim_path": "/World", "filters": ["USDGeom"]}
            })
        );
    }

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let all = [
            Outbound::LoadingStateQuery {},
            Outbound::OpenStageRequest { url: "a.usd".into() },
            Outbound::GetChildrenRequest {
                prim_path: "/World".into(),
                filters: vec![],
            },
            Outbound::MakePrimsPickable { paths: vec![] },
            Outbound::SelectPrimsRequest { paths: vec![] },
            Outbound::ResetStage {},
            Outbound::SwitchCameraRequest {
                camera_path: String::new(),
            },
        ];
        for msg in all {
            let value: Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
            assert_eq!(value["event_type"], msg.event_type());
        }
    }

    #[test]
    fn test_inbound_loading_state() {
        let msg = Inbound::from_frame(
            r#"{"event_type": "loadingStateResponse", "payload": {"url": "z/a.usd", "loading_state": "idle"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::LoadingStateResponse {
                url: Some("z/a.usd".into()),
                loading_state: HostLoadState::Idle,
            }
        );

        let msg = Inbound::from_frame(
            r#"{"event_type": "loadingStateResponse", "payload": {"url": null, "loading_state": "loading"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::LoadingStateResponse {
                url: None,
                loading_state: HostLoadState::Busy,
            }
        );
    }

    #[test]
    fn test_inbound_missing_payload_and_unknown_events() {
        let msg = Inbound::from_frame(r#"{"event_type": "updateProgressActivity"}"#).unwrap();
        assert_eq!(msg, Inbound::UpdateProgressActivity { text: None });

        assert!(matches!(
            Inbound::from_frame(r#"{"event_type": "somethingElse", "payload": {}}"#),
            Err(ProtocolError::UnknownEvent(t)) if t == "somethingElse"
        ));
        assert!(matches!(
            Inbound::from_frame("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Inbound::from_frame(r#"{"event_type": "openedStageResult", "payload": {}}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_result_field_is_lenient() {
        let msg = Inbound::from_frame(
            r#"{"event_type": "openedStageResult", "payload": {"url": "a.usd", "result": "error"}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            Inbound::OpenedStageResult {
                result: HostResult::Failure,
                ..
            }
        ));
    }

    #[test]
    fn test_prim_record_children_presence() {
        let records = parse_children(&json!([
            {"path": "/World/A", "name": "A"},
            {"path": "/World/B", "children": {}},
            {"path": "/World/C", "children": null},
            {"path": "/World/D", "children": []},
            {"name": "no path"},
        ]));
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].children, None);
        assert_eq!(records[1].children, Some(json!({})));
        assert_eq!(records[2].children, Some(Value::Null));
        assert_eq!(records[3].children, Some(json!([])));

        assert!(parse_children(&json!({})).is_empty());
        assert!(parse_children(&Value::Null).is_empty());
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(
            parse_paths(&json!(["/World/A", 3, "/World/B"])),
            vec!["/World/A", "/World/B"]
        );
        assert!(parse_paths(&json!("/World/A")).is_empty());
    }
}
