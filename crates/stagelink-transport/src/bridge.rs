//! In-process channel bridge between a host connection and a session.

use async_trait::async_trait;
use stagelink_core::{ChannelError, MessageChannel};
use tokio::sync::mpsc;

use crate::protocol::{Inbound, Outbound, ProtocolError};

/// Host side of the bridge.
pub struct HostEndpoint {
    /// Sender for frames arriving from the host.
    pub inbound_tx: mpsc::UnboundedSender<String>,
    /// Receiver for frames the session sends to the host.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl HostEndpoint {
    /// Create a connected pair.
    ///
    /// Returns the host side (owned by whatever speaks to the streaming
    /// host) and the session side (handed to the session runtime).
    #[must_use]
    pub fn new() -> (Self, SessionEndpoint) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let host = Self {
            inbound_tx,
            outbound_rx,
        };

        let session = SessionEndpoint {
            outbound: OutboundSender { tx: outbound_tx },
            inbound_rx,
        };

        (host, session)
    }

    /// Deliver a raw frame from the host.
    ///
    /// # Errors
    /// Returns error if the session side has gone away.
    pub fn deliver_frame(&self, frame: impl Into<String>) -> Result<(), ChannelError> {
        self.inbound_tx
            .send(frame.into())
            .map_err(|_| ChannelError::Closed)
    }

    /// Deliver a typed event from the host.
    ///
    /// # Errors
    /// Returns error if encoding fails or the session side has gone away.
    pub fn deliver(&self, event: &Inbound) -> Result<(), ChannelError> {
        let frame = event
            .to_frame()
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        self.deliver_frame(frame)
    }

    /// Receive the next frame the session sent (waits).
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.outbound_rx.recv().await
    }

    /// Receive the next outbound message if one is queued (non-blocking).
    ///
    /// Frames that do not decode are reported as errors.
    pub fn try_recv(&mut self) -> Option<Result<Outbound, ProtocolError>> {
        self.outbound_rx
            .try_recv()
            .ok()
            .map(|frame| Outbound::from_frame(&frame))
    }

    /// Drain every queued outbound message, dropping undecodable frames.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Some(next) = self.try_recv() {
            match next {
                Ok(msg) => out.push(msg),
                Err(e) => tracing::warn!("Undecodable outbound frame: {e}"),
            }
        }
        out
    }
}

/// Session side of the bridge.
pub struct SessionEndpoint {
    /// Cloneable outbound half.
    pub outbound: OutboundSender,
    /// Receiver for frames from the host.
    pub inbound_rx: mpsc::UnboundedReceiver<String>,
}

impl SessionEndpoint {
    /// Split into the outbound sender and the inbound receiver.
    #[must_use]
    pub fn split(self) -> (OutboundSender, mpsc::UnboundedReceiver<String>) {
        (self.outbound, self.inbound_rx)
    }
}

/// Outbound half of a [`SessionEndpoint`].
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl MessageChannel for OutboundSender {
    async fn send(&self, frame: String) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }
}
