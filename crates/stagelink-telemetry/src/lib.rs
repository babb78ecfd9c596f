//! Best-effort telemetry refresh from an industrial-data relay.
//!
//! Provides:
//! - `TelemetryRefresher` - Fetch the configured attributes with per-attribute degradation
//! - `TelemetrySnapshot` - Renderable result, always complete
//! - `HttpRelayClient` - `TelemetrySource` over the relay's HTTP endpoints

pub mod client;
pub mod config;
pub mod refresher;
pub mod snapshot;

pub use client::HttpRelayClient;
pub use config::{AttributeSpec, TelemetryConfig};
pub use refresher::TelemetryRefresher;
pub use snapshot::{Sentinel, TelemetryReading, TelemetrySnapshot, TelemetryValue};
