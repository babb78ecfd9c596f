//! Session controller: the state machine between the UI and the streaming host.
//!
//! The controller never performs I/O. Every entry point mutates state and
//! returns the [`Command`]s the runtime must carry out.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stagelink_core::{
    Asset, AssetCatalog, CameraFailurePolicy, ConfigError, SessionConfig, TelemetryPolicy,
};
use stagelink_telemetry::TelemetrySnapshot;
use stagelink_transport::{HostLoadState, HostResult, Inbound, Outbound, protocol::parse_paths};

use crate::{
    scene_tree::{NodeId, SceneTree},
    view::{SessionView, TelemetryPanelView},
};

const LOADING_ASSET_TEXT: &str = "Loading Asset...";
const ASSET_LOADED_TEXT: &str = "Asset loaded";

/// Load lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The host has not acknowledged liveness yet.
    AwaitingReady,
    /// An asset open is in progress.
    Loading,
    /// A known asset is loaded and the host is idle.
    IdleValid,
    /// The host is idle with content that is not one of our assets.
    IdleInvalid,
}

/// Active viewpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "path", rename_all = "snake_case")]
pub enum CameraMode {
    /// Free camera.
    #[default]
    Free,
    /// A camera prim exposed by the asset.
    Camera(String),
}

impl CameraMode {
    /// Interpret a camera path from the host; empty means free.
    #[must_use]
    pub fn from_wire(path: &str) -> Self {
        if path.is_empty() {
            Self::Free
        } else {
            Self::Camera(path.to_string())
        }
    }

    /// Camera path as written on the wire.
    #[must_use]
    pub fn wire_path(&self) -> &str {
        self.camera().unwrap_or_default()
    }

    /// Camera prim path, `None` for the free camera.
    #[must_use]
    pub fn camera(&self) -> Option<&str> {
        match self {
            Self::Free => None,
            Self::Camera(path) => Some(path),
        }
    }
}

/// Side effect requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a message to the host.
    Send(Outbound),
    /// Start a telemetry refresh tagged with `seq`.
    RefreshTelemetry { seq: u64 },
}

#[derive(Debug, Default)]
struct TelemetryPanel {
    visible: bool,
    object_path: String,
    snapshot: TelemetrySnapshot,
}

#[derive(Debug)]
struct Presentation {
    loading_text: String,
    is_loading: bool,
    show_stream: bool,
    show_ui: bool,
}

/// The session state machine.
#[derive(Debug)]
pub struct SessionController {
    catalog: AssetCatalog,
    root_prim_path: String,
    child_filters: Vec<String>,
    telemetry_policy: TelemetryPolicy,
    camera_failure: CameraFailurePolicy,

    state: SessionState,
    ready: bool,
    tree: SceneTree,
    selection: Vec<NodeId>,
    expanded: BTreeSet<String>,
    camera: CameraMode,
    confirmed_camera: CameraMode,
    presentation: Presentation,
    panel: TelemetryPanel,
    telemetry_seq: u64,
    last_error: Option<String>,
}

impl SessionController {
    /// Create a controller in `AwaitingReady`.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let SessionConfig {
            source,
            assets,
            root_prim_path,
            child_filters,
            telemetry_policy,
            camera_failure,
            ..
        } = config;

        Ok(Self {
            catalog: AssetCatalog::new(assets)?,
            root_prim_path,
            child_filters,
            telemetry_policy,
            camera_failure,
            state: SessionState::AwaitingReady,
            ready: false,
            tree: SceneTree::new(),
            selection: Vec::new(),
            expanded: BTreeSet::new(),
            camera: CameraMode::Free,
            confirmed_camera: CameraMode::Free,
            presentation: Presentation {
                loading_text: source.initial_loading_text().to_string(),
                is_loading: source.initially_loading(),
                show_stream: false,
                show_ui: false,
            },
            panel: TelemetryPanel::default(),
            telemetry_seq: 0,
            last_error: None,
        })
    }

    /// Current load state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the host has acknowledged liveness.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Currently selected asset.
    #[must_use]
    pub fn selected_asset(&self) -> &Asset {
        self.catalog.selected()
    }

    /// Active camera mode.
    #[must_use]
    pub const fn camera(&self) -> &CameraMode {
        &self.camera
    }

    /// The materialized scene tree.
    #[must_use]
    pub const fn tree(&self) -> &SceneTree {
        &self.tree
    }

    /// Paths of the selected prims, in selection order.
    #[must_use]
    pub fn selected_paths(&self) -> Vec<String> {
        self.selection
            .iter()
            .filter_map(|id| self.tree.path(*id).map(str::to_owned))
            .collect()
    }

    /// Sequence number of the latest telemetry refresh issued.
    #[must_use]
    pub const fn telemetry_seq(&self) -> u64 {
        self.telemetry_seq
    }

    /// Most recent failure worth showing to the user.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a failure for the UI.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Apply an event from the host.
    pub fn handle_inbound(&mut self, event: Inbound) -> Vec<Command> {
        let mut out = Vec::new();
        match event {
            Inbound::LoadingStateResponse { url, loading_state } => {
                self.on_loading_state(url.as_deref().unwrap_or_default(), loading_state, &mut out);
            }
            Inbound::OpenedStageResult { url, result, error } => match result {
                HostResult::Success => {
                    tracing::debug!(url = url.as_deref().unwrap_or_default(), "Stage opened");
                    out.push(Command::Send(Outbound::LoadingStateQuery {}));
                }
                HostResult::Failure => {
                    let message = error.unwrap_or_else(|| "unknown error".to_string());
                    tracing::error!("Failed to open stage: {message}");
                    self.last_error = Some(format!("Failed to open stage: {message}"));
                }
            },
            Inbound::UpdateProgressActivity { text } => {
                tracing::debug!(text = text.as_deref().unwrap_or_default(), "Load activity");
                if self.state != SessionState::Loading {
                    self.enter_loading();
                }
            }
            Inbound::UpdateProgressAmount { amount } => {
                tracing::debug!(?amount, "Load progress");
            }
            Inbound::StageSelectionChanged { prims } => {
                self.on_selection_changed(&parse_paths(&prims), &mut out);
            }
            Inbound::GetChildrenResponse {
                prim_path,
                children,
            } => {
                let path = prim_path.unwrap_or_default();
                let graft = self.tree.graft_children(&path, &children);
                if graft.target.is_none() {
                    tracing::debug!(%path, "Children response replaced the tree");
                }
                let tree = &self.tree;
                self.selection.retain(|id| tree.contains(*id));
                if !graft.attached.is_empty() {
                    out.push(Command::Send(Outbound::MakePrimsPickable {
                        paths: graft.attached,
                    }));
                }
            }
            Inbound::SwitchCameraResponse {
                camera_path,
                result,
                error,
            } => match result {
                HostResult::Success => {
                    let mode = CameraMode::from_wire(&camera_path);
                    tracing::info!(camera = mode.wire_path(), "Camera switched");
                    self.camera = mode.clone();
                    self.confirmed_camera = mode;
                }
                HostResult::Failure => {
                    let message = error.unwrap_or_else(|| "unknown error".to_string());
                    tracing::error!(camera = %camera_path, "Failed to switch camera: {message}");
                    self.last_error = Some(format!("Failed to switch camera: {message}"));
                    if self.camera_failure == CameraFailurePolicy::Rollback {
                        self.camera = self.confirmed_camera.clone();
                    }
                }
            },
        }
        out
    }

    /// Open the asset with the given display name.
    ///
    /// Unknown names are ignored.
    pub fn select_asset(&mut self, name: &str) -> Vec<Command> {
        let Some(index) = self.catalog.position_by_name(name) else {
            tracing::warn!(%name, "Ignoring pick of unknown asset");
            return Vec::new();
        };
        self.catalog.select(index);
        let mut out = Vec::new();
        self.open_selected_asset(&mut out);
        out
    }

    /// Select prims from the UI.
    pub fn select_prims(&mut self, paths: &[String]) -> Vec<Command> {
        let mut out = Vec::new();
        self.set_selection(paths, &mut out);
        out.insert(
            0,
            Command::Send(Outbound::SelectPrimsRequest {
                paths: self.selected_paths(),
            }),
        );
        out
    }

    /// Clear the selection and reset the remote stage.
    pub fn reset_stage(&mut self) -> Vec<Command> {
        self.selection.clear();
        vec![
            Command::Send(Outbound::SelectPrimsRequest { paths: Vec::new() }),
            Command::Send(Outbound::ResetStage {}),
        ]
    }

    /// Switch camera, updating the local mode before the host confirms.
    ///
    /// Cameras the selected asset does not expose are ignored.
    pub fn select_camera(&mut self, mode: CameraMode) -> Vec<Command> {
        let asset = self.catalog.selected();
        if let Some(path) = mode.camera().filter(|p| !asset.has_camera(p)) {
            tracing::warn!(camera = %path, "Ignoring camera not exposed by the asset");
            return Vec::new();
        }
        let camera_path = mode.wire_path().to_string();
        self.camera = mode;
        vec![Command::Send(Outbound::SwitchCameraRequest { camera_path })]
    }

    /// Expand a tree node, fetching its children if they were never queried.
    pub fn expand_prim(&mut self, path: &str) -> Vec<Command> {
        let Some(id) = self.tree.find_by_path(path) else {
            tracing::warn!(%path, "Ignoring expansion of unknown prim");
            return Vec::new();
        };
        self.expanded.insert(path.to_string());
        if self.tree.needs_children(id) {
            vec![self.children_request(path)]
        } else {
            Vec::new()
        }
    }

    /// Collapse a tree node.
    pub fn collapse_prim(&mut self, path: &str) -> Vec<Command> {
        self.expanded.remove(path);
        Vec::new()
    }

    /// Hide the telemetry panel.
    pub fn close_telemetry_panel(&mut self) -> Vec<Command> {
        self.close_panel();
        Vec::new()
    }

    /// Refresh the telemetry shown in the open panel.
    pub fn refresh_telemetry(&mut self) -> Vec<Command> {
        if self.panel.visible {
            vec![self.begin_refresh()]
        } else {
            Vec::new()
        }
    }

    /// Commit a finished refresh.
    ///
    /// Returns false, leaving the panel untouched, if a newer refresh has
    /// been issued since `seq`.
    pub fn complete_telemetry(&mut self, seq: u64, snapshot: TelemetrySnapshot) -> bool {
        if seq != self.telemetry_seq {
            tracing::debug!(seq, latest = self.telemetry_seq, "Dropping stale telemetry");
            return false;
        }
        self.panel.snapshot = snapshot;
        true
    }

    /// Read-only snapshot for the UI.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let asset = self.catalog.selected();
        SessionView {
            ready: self.ready,
            state: self.state,
            assets: self.catalog.assets().to_vec(),
            selected_asset: asset.name.clone(),
            cameras: asset.cameras.clone(),
            camera: self.camera.clone(),
            tree: self.tree.roots(),
            selection: self.selected_paths(),
            expanded: self.expanded.iter().cloned().collect(),
            loading_text: self.presentation.loading_text.clone(),
            is_loading: self.presentation.is_loading,
            show_stream: self.presentation.show_stream,
            show_ui: self.presentation.show_ui,
            telemetry: TelemetryPanelView {
                visible: self.panel.visible,
                object_path: self.panel.object_path.clone(),
                snapshot: self.panel.snapshot.clone(),
            },
            last_error: self.last_error.clone(),
        }
    }

    fn on_loading_state(&mut self, url: &str, loading_state: HostLoadState, out: &mut Vec<Command>) {
        if !self.ready {
            self.ready = true;
            tracing::info!("Host is ready");
            out.push(Command::Send(Outbound::LoadingStateQuery {}));
            return;
        }

        let idle = loading_state == HostLoadState::Idle;
        let resolved = self.catalog.resolve(url);

        if let Some(index) = resolved.filter(|i| *i != self.catalog.selected_index()) {
            self.catalog.select(index);
            tracing::info!(asset = %self.catalog.selected().name, "Following asset opened on host");
        }

        if url.is_empty() {
            tracing::info!("Host has no stage open");
            self.open_selected_asset(out);
        } else if resolved.is_none() && idle {
            tracing::warn!(%url, "Host has an unknown stage open");
            self.state = SessionState::IdleInvalid;
            self.open_selected_asset(out);
        } else if resolved.is_some() && idle {
            out.push(self.children_request(&self.root_prim_path));
            self.state = SessionState::IdleValid;
            self.presentation.loading_text = ASSET_LOADED_TEXT.to_string();
            self.presentation.is_loading = false;
            self.presentation.show_stream = true;
            self.presentation.show_ui = true;
            tracing::info!(asset = %self.catalog.selected().name, "Asset loaded");
        } else if resolved.is_some() && self.state != SessionState::Loading {
            tracing::info!(asset = %self.catalog.selected().name, "Host is busy loading asset");
            self.enter_loading();
        }
    }

    fn on_selection_changed(&mut self, paths: &[String], out: &mut Vec<Command>) {
        let Some(first) = paths.first() else {
            self.selection.clear();
            self.close_panel();
            return;
        };

        let qualifies = self.telemetry_policy.qualifies(
            &self.catalog.selected().name,
            self.camera.camera(),
            first,
        );
        if qualifies {
            self.panel.visible = true;
            self.panel.object_path.clone_from(first);
            out.push(self.begin_refresh());
        } else {
            self.close_panel();
        }

        self.set_selection(paths, out);
    }

    /// Resolve `paths` into the selection and fetch children where needed.
    fn set_selection(&mut self, paths: &[String], out: &mut Vec<Command>) {
        self.selection.clear();
        for path in paths {
            match self.tree.find_by_path(path) {
                Some(id) if !self.selection.contains(&id) => self.selection.push(id),
                Some(_) => {}
                None => tracing::debug!(%path, "Dropping unresolved selection"),
            }
        }

        let pending: Vec<String> = self
            .selection
            .iter()
            .filter(|id| self.tree.needs_children(**id))
            .filter_map(|id| self.tree.path(*id).map(str::to_owned))
            .collect();
        for path in pending {
            out.push(self.children_request(&path));
        }
    }

    fn open_selected_asset(&mut self, out: &mut Vec<Command>) {
        self.enter_loading();
        self.presentation.show_stream = false;
        self.tree.clear();
        self.selection.clear();
        self.expanded.clear();
        self.camera = CameraMode::Free;
        self.confirmed_camera = CameraMode::Free;

        let url = self.catalog.selected().url.clone();
        tracing::info!(%url, "Opening asset");
        out.push(Command::Send(Outbound::OpenStageRequest { url }));
    }

    fn enter_loading(&mut self) {
        self.state = SessionState::Loading;
        self.presentation.loading_text = LOADING_ASSET_TEXT.to_string();
        self.presentation.is_loading = true;
    }

    fn begin_refresh(&mut self) -> Command {
        self.telemetry_seq += 1;
        self.panel.snapshot = self.panel.snapshot.loading();
        Command::RefreshTelemetry {
            seq: self.telemetry_seq,
        }
    }

    fn close_panel(&mut self) {
        self.panel.visible = false;
        self.panel.object_path.clear();
    }

    fn children_request(&self, path: &str) -> Command {
        Command::Send(Outbound::GetChildrenRequest {
            prim_path: path.to_string(),
            filters: self.child_filters.clone(),
        })
    }
}
