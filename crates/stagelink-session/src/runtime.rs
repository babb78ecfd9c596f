//! Session event loop and the UI-facing handle.

use std::sync::Arc;

use futures::{StreamExt, stream::BoxStream};
use serde::Deserialize;
use stagelink_core::{ConfigError, MessageChannel, SessionConfig, TelemetrySource};
use stagelink_telemetry::{TelemetryRefresher, TelemetrySnapshot};
use stagelink_transport::{Inbound, ProtocolError};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    controller::{CameraMode, Command, SessionController},
    prober::ReadinessProber,
    view::SessionView,
};

/// Session runtime error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Session has stopped")]
    Stopped,
}

/// Action requested by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum UiAction {
    SelectAsset { name: String },
    SelectPrims { paths: Vec<String> },
    ResetStage,
    SelectCamera { camera: CameraMode },
    ExpandPrim { path: String },
    CollapsePrim { path: String },
    CloseTelemetryPanel,
    RefreshTelemetry,
}

/// Drives a [`SessionController`] from host frames, UI actions and
/// telemetry completions.
pub struct SessionRuntime<C, T>
where
    C: MessageChannel + ?Sized + 'static,
    T: TelemetrySource + ?Sized + 'static,
{
    id: Uuid,
    controller: SessionController,
    channel: Arc<C>,
    refresher: Arc<TelemetryRefresher<T>>,
    prober: ReadinessProber,
    inbound_rx: mpsc::UnboundedReceiver<String>,
    action_rx: mpsc::UnboundedReceiver<UiAction>,
    telemetry_tx: mpsc::UnboundedSender<(u64, TelemetrySnapshot)>,
    telemetry_rx: mpsc::UnboundedReceiver<(u64, TelemetrySnapshot)>,
    view_tx: watch::Sender<SessionView>,
    ready_tx: watch::Sender<bool>,
}

impl<C, T> SessionRuntime<C, T>
where
    C: MessageChannel + ?Sized + 'static,
    T: TelemetrySource + ?Sized + 'static,
{
    /// Create a runtime and the handle the UI drives it with.
    ///
    /// `inbound_rx` carries raw frames from the host; outbound frames go to
    /// `channel`.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn new(
        config: SessionConfig,
        channel: Arc<C>,
        inbound_rx: mpsc::UnboundedReceiver<String>,
        refresher: TelemetryRefresher<T>,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let poll_interval = config.poll_interval();
        let controller = SessionController::new(config)?;

        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(controller.view());
        let (ready_tx, _) = watch::channel(false);

        let id = Uuid::new_v4();
        let runtime = Self {
            id,
            controller,
            channel,
            refresher: Arc::new(refresher),
            prober: ReadinessProber::new(poll_interval),
            inbound_rx,
            action_rx,
            telemetry_tx,
            telemetry_rx,
            view_tx,
            ready_tx,
        };
        let handle = SessionHandle {
            id,
            action_tx,
            view_rx,
        };
        Ok((runtime, handle))
    }

    /// Session identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Run until the host channel closes or every handle is dropped.
    pub async fn run(mut self) {
        let span = tracing::info_span!("session", id = %self.id);
        async move {
            tracing::info!(asset = %self.controller.selected_asset().name, "Session started");
            self.prober
                .start(Arc::clone(&self.channel), self.ready_tx.subscribe());

            loop {
                tokio::select! {
                    frame = self.inbound_rx.recv() => {
                        let Some(frame) = frame else {
                            tracing::info!("Host channel closed");
                            break;
                        };
                        self.on_frame(&frame).await;
                    }
                    action = self.action_rx.recv() => {
                        let Some(action) = action else {
                            tracing::info!("All session handles dropped");
                            break;
                        };
                        let commands = self.apply(action);
                        self.execute(commands).await;
                    }
                    Some((seq, snapshot)) = self.telemetry_rx.recv() => {
                        self.controller.complete_telemetry(seq, snapshot);
                    }
                }
                self.publish();
            }

            self.prober.stop();
        }
        .instrument(span)
        .await;
    }

    async fn on_frame(&mut self, frame: &str) {
        match Inbound::from_frame(frame) {
            Ok(event) => {
                let commands = self.controller.handle_inbound(event);
                self.execute(commands).await;
            }
            Err(ProtocolError::UnknownEvent(event_type)) => {
                tracing::debug!(%event_type, "Ignoring unknown host event");
            }
            Err(e) => {
                tracing::warn!("Malformed message from host: {e}");
                self.controller
                    .report_error(format!("Malformed message from host: {e}"));
            }
        }
    }

    fn apply(&mut self, action: UiAction) -> Vec<Command> {
        tracing::debug!(?action, "UI action");
        match action {
            UiAction::SelectAsset { name } => self.controller.select_asset(&name),
            UiAction::SelectPrims { paths } => self.controller.select_prims(&paths),
            UiAction::ResetStage => self.controller.reset_stage(),
            UiAction::SelectCamera { camera } => self.controller.select_camera(camera),
            UiAction::ExpandPrim { path } => self.controller.expand_prim(&path),
            UiAction::CollapsePrim { path } => self.controller.collapse_prim(&path),
            UiAction::CloseTelemetryPanel => self.controller.close_telemetry_panel(),
            UiAction::RefreshTelemetry => self.controller.refresh_telemetry(),
        }
    }

    async fn execute(&self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Send(message) => {
                    let frame = match message.to_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!("Failed to encode {}: {e}", message.event_type());
                            continue;
                        }
                    };
                    tracing::debug!(event_type = message.event_type(), "Sending to host");
                    if let Err(e) = self.channel.send(frame).await {
                        tracing::warn!("Failed to send {}: {e}", message.event_type());
                    }
                }
                Command::RefreshTelemetry { seq } => {
                    let refresher = Arc::clone(&self.refresher);
                    let done = self.telemetry_tx.clone();
                    tokio::spawn(
                        async move {
                            let snapshot = refresher.refresh().await;
                            let _ = done.send((seq, snapshot));
                        }
                        .in_current_span(),
                    );
                }
            }
        }
    }

    fn publish(&self) {
        let ready = self.controller.is_ready();
        self.ready_tx.send_if_modified(|current| {
            let changed = *current != ready;
            *current = ready;
            changed
        });
        self.view_tx.send_replace(self.controller.view());
    }
}

/// UI handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    action_tx: mpsc::UnboundedSender<UiAction>,
    view_rx: watch::Receiver<SessionView>,
}

impl SessionHandle {
    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a UI action.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn send(&self, action: UiAction) -> Result<(), SessionError> {
        self.action_tx
            .send(action)
            .map_err(|_| SessionError::Stopped)
    }

    /// Open an asset by display name.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn select_asset(&self, name: impl Into<String>) -> Result<(), SessionError> {
        self.send(UiAction::SelectAsset { name: name.into() })
    }

    /// Select prims by path.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn select_prims(&self, paths: Vec<String>) -> Result<(), SessionError> {
        self.send(UiAction::SelectPrims { paths })
    }

    /// Reset the remote stage.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn reset_stage(&self) -> Result<(), SessionError> {
        self.send(UiAction::ResetStage)
    }

    /// Switch camera.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn select_camera(&self, camera: CameraMode) -> Result<(), SessionError> {
        self.send(UiAction::SelectCamera { camera })
    }

    /// Expand a tree node.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn expand_prim(&self, path: impl Into<String>) -> Result<(), SessionError> {
        self.send(UiAction::ExpandPrim { path: path.into() })
    }

    /// Collapse a tree node.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn collapse_prim(&self, path: impl Into<String>) -> Result<(), SessionError> {
        self.send(UiAction::CollapsePrim { path: path.into() })
    }

    /// Hide the telemetry panel.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn close_telemetry_panel(&self) -> Result<(), SessionError> {
        self.send(UiAction::CloseTelemetryPanel)
    }

    /// Refresh the open telemetry panel.
    ///
    /// # Errors
    /// Returns error if the session has stopped.
    pub fn refresh_telemetry(&self) -> Result<(), SessionError> {
        self.send(UiAction::RefreshTelemetry)
    }

    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    /// Wait until the published view satisfies `predicate`.
    ///
    /// # Errors
    /// Returns error if the session stops first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, SessionError> {
        self.view_rx
            .wait_for(predicate)
            .await
            .map(|view| view.clone())
            .map_err(|_| SessionError::Stopped)
    }

    /// Stream of published views, starting with the current one.
    #[must_use]
    pub fn updates(&self) -> BoxStream<'static, SessionView> {
        WatchStream::new(self.view_rx.clone()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use stagelink_core::{Asset, AttributeRef, AttributeValue, RelayError};
    use stagelink_telemetry::{AttributeSpec, TelemetryValue};
    use stagelink_transport::{HostEndpoint, HostLoadState, Outbound};
    use tokio::time::timeout;

    use super::*;
    use crate::controller::SessionState;

    struct FakeRelay;

    #[async_trait]
    impl TelemetrySource for FakeRelay {
        async fn list_attributes(&self) -> Result<Vec<AttributeRef>, RelayError> {
            Ok(vec![AttributeRef {
                name: "temperature".into(),
                web_id: "W1".into(),
            }])
        }

        async fn fetch_value(&self, _web_id: &str) -> Result<AttributeValue, RelayError> {
            Ok(AttributeValue {
                value: json!(21.2397),
                timestamp: None,
            })
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    async fn next(host: &mut HostEndpoint) -> Outbound {
        let frame = timeout(WAIT, host.recv_frame())
            .await
            .expect("timed out waiting for frame")
            .expect("session closed");
        Outbound::from_frame(&frame).unwrap()
    }

    fn start() -> (HostEndpoint, SessionHandle, tokio::task::JoinHandle<()>) {
        let (host, session) = HostEndpoint::new();
        let (outbound, inbound_rx) = session.split();
        let config = SessionConfig {
            assets: vec![Asset::new("A", "x/a.usd"), Asset::new("B", "y/b.usd")],
            poll_interval_ms: 60_000,
            ..SessionConfig::default()
        };
        let refresher = TelemetryRefresher::new(
            Arc::new(FakeRelay),
            vec![AttributeSpec::new("temperature", "Temp 01", "\u{b0}C")],
        );
        let (runtime, handle) =
            SessionRuntime::new(config, Arc::new(outbound), inbound_rx, refresher).unwrap();
        let task = tokio::spawn(runtime.run());
        (host, handle, task)
    }

    #[tokio::test]
    async fn test_session_end_to_end() {
        let (mut host, mut handle, _task) = start();

        assert_eq!(next(&mut host).await, Outbound::LoadingStateQuery {});

        host.deliver(&Inbound::LoadingStateResponse {
            url: None,
            loading_state: HostLoadState::Busy,
        })
        .unwrap();
        assert_eq!(next(&mut host).await, Outbound::LoadingStateQuery {});

        host.deliver(&Inbound::LoadingStateResponse {
            url: Some("z/a.usd".into()),
            loading_state: HostLoadState::Idle,
        })
        .unwrap();
        assert_eq!(
            next(&mut host).await,
            Outbound::GetChildrenRequest {
                prim_path: "/World".into(),
                filters: vec!["USDGeom".into()],
            }
        );
        let view = timeout(WAIT, handle.wait_for(|v| v.state == SessionState::IdleValid))
            .await
            .unwrap()
            .unwrap();
        assert!(view.ready);
        assert_eq!(view.selected_asset, "A");

        host.deliver(&Inbound::GetChildrenResponse {
            prim_path: Some("/World".into()),
            children: json!([{"path": "/World/Panel", "children": {}}]),
        })
        .unwrap();
        assert_eq!(
            next(&mut host).await,
            Outbound::MakePrimsPickable {
                paths: vec!["/World/Panel".into()]
            }
        );

        host.deliver(&Inbound::StageSelectionChanged {
            prims: json!(["/World/Panel"]),
        })
        .unwrap();
        assert_eq!(
            next(&mut host).await,
            Outbound::GetChildrenRequest {
                prim_path: "/World/Panel".into(),
                filters: vec!["USDGeom".into()],
            }
        );

        let view = timeout(
            WAIT,
            handle.wait_for(|v| v.telemetry.visible && !v.telemetry.snapshot.is_loading),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(view.selection, vec!["/World/Panel"]);
        assert_eq!(
            view.telemetry.snapshot.readings[0].value,
            TelemetryValue::Number(21.24)
        );
    }

    #[tokio::test]
    async fn test_ui_actions_reach_host() {
        let (mut host, handle, _task) = start();
        assert_eq!(next(&mut host).await, Outbound::LoadingStateQuery {});

        tokio_test::assert_ok!(handle.reset_stage());
        assert_eq!(
            next(&mut host).await,
            Outbound::SelectPrimsRequest { paths: Vec::new() }
        );
        assert_eq!(next(&mut host).await, Outbound::ResetStage {});

        tokio_test::assert_ok!(handle.select_asset("B"));
        assert_eq!(
            next(&mut host).await,
            Outbound::OpenStageRequest {
                url: "y/b.usd".into()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames() {
        let (mut host, mut handle, _task) = start();
        let mut updates = handle.updates();
        let first = updates.next().await.unwrap();
        assert_eq!(first.state, SessionState::AwaitingReady);
        assert_eq!(next(&mut host).await, Outbound::LoadingStateQuery {});

        host.deliver_frame(r#"{"event_type": "somethingNew", "payload": {}}"#)
            .unwrap();
        host.deliver_frame("not json").unwrap();

        let view = timeout(WAIT, handle.wait_for(|v| v.last_error.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(
            view.last_error
                .unwrap_or_default()
                .starts_with("Malformed message from host")
        );
        assert!(!view.ready);
    }

    #[tokio::test]
    async fn test_runtime_stops_when_host_closes() {
        let (host, handle, task) = start();
        drop(host);
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(handle.reset_stage(), Err(SessionError::Stopped)));
    }

    #[test]
    fn test_ui_action_json() {
        let action: UiAction = serde_json::from_value(json!({
            "action": "select-camera",
            "camera": {"mode": "camera", "path": "/World/Cams/Front"}
        }))
        .unwrap();
        assert_eq!(
            action,
            UiAction::SelectCamera {
                camera: CameraMode::Camera("/World/Cams/Front".into())
            }
        );
        let action: UiAction = serde_json::from_value(json!({"action": "reset-stage"})).unwrap();
        assert_eq!(action, UiAction::ResetStage);
    }
}
