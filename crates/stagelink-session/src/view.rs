//! Read-only state handed to the UI.

use serde::Serialize;
use stagelink_core::Asset;
use stagelink_telemetry::TelemetrySnapshot;

use crate::{
    controller::{CameraMode, SessionState},
    scene_tree::Prim,
};

/// Everything the UI renders, captured at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub ready: bool,
    pub state: SessionState,
    pub assets: Vec<Asset>,
    pub selected_asset: String,
    /// Cameras exposed by the selected asset.
    pub cameras: Vec<String>,
    pub camera: CameraMode,
    pub tree: Vec<Prim>,
    pub selection: Vec<String>,
    pub expanded: Vec<String>,
    pub loading_text: String,
    pub is_loading: bool,
    pub show_stream: bool,
    pub show_ui: bool,
    pub telemetry: TelemetryPanelView,
    pub last_error: Option<String>,
}

/// Telemetry panel state.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryPanelView {
    pub visible: bool,
    /// Path of the object that opened the panel; empty when closed.
    pub object_path: String,
    pub snapshot: TelemetrySnapshot,
}
