//! Session orchestration for a streamed stage.
//!
//! Provides:
//! - `SceneTree` - Partially materialized scene graph with a path index
//! - `SessionController` - State machine turning host events and UI actions into commands
//! - `ReadinessProber` - Liveness polling until the host answers
//! - `SessionRuntime` / `SessionHandle` - Event loop and the UI surface

pub mod controller;
pub mod prober;
pub mod runtime;
pub mod scene_tree;
pub mod view;

pub use controller::{CameraMode, Command, SessionController, SessionState};
pub use prober::ReadinessProber;
pub use runtime::{SessionError, SessionHandle, SessionRuntime, UiAction};
pub use scene_tree::{Children, NodeId, Prim, SceneTree};
pub use view::{SessionView, TelemetryPanelView};
