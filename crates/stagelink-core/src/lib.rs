//! Core data model for streamed-stage session synchronization.
//!
//! This crate provides the shared building blocks:
//! - `Asset` / `AssetCatalog` - Selectable stages with file-name identity
//! - `SessionConfig` - Controller configuration and policies
//! - `MessageChannel` and `TelemetrySource` traits

pub mod asset;
pub mod config;
pub mod traits;

pub use asset::{Asset, AssetCatalog};
pub use config::{CameraFailurePolicy, ConfigError, SessionConfig, StreamSource, TelemetryPolicy};
pub use traits::{
    AttributeRef, AttributeValue, ChannelError, MessageChannel, RelayError, TelemetrySource,
};
