//! Transport layer for the streaming host connection.
//!
//! Provides:
//! - Wire protocol (JSON envelopes over a closed event vocabulary)
//! - In-process channel bridge implementing `MessageChannel`

pub mod bridge;
pub mod protocol;

pub use bridge::{HostEndpoint, OutboundSender, SessionEndpoint};
pub use protocol::{HostLoadState, HostResult, Inbound, Outbound, PrimRecord, ProtocolError};
