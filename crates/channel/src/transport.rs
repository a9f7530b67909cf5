//! Transport seam (mechanics only).
//!
//! A [`Connector`] opens one bidirectional text transport and hands back a
//! [`TransportLink`]: an outbound queue the channel writes frames into, and an
//! inbound queue of frames and the final close notification.
//!
//! Implementations own their IO tasks. The channel never sees sockets, only
//! these two queues, which keeps it testable with the in-memory transport.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Frame written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Close the transport cleanly.
    Close,
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    /// Terminal; nothing follows on this link.
    Closed(CloseInfo),
}

/// How a transport ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// A normal, intentional close. Clean closes do not trigger reconnects.
    pub clean: bool,
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    /// Normal closure (close code 1000).
    pub const NORMAL: u16 = 1000;

    pub fn clean(reason: impl Into<String>) -> Self {
        Self {
            clean: true,
            code: Some(Self::NORMAL),
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            clean: false,
            code: None,
            reason: reason.into(),
        }
    }

    /// Classify a close frame code: only a normal closure is clean.
    pub fn from_code(code: u16, reason: impl Into<String>) -> Self {
        Self {
            clean: code == Self::NORMAL,
            code: Some(code),
            reason: reason.into(),
        }
    }
}

/// The two queues of an open transport.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<OutboundFrame>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        (self.outbound, self.inbound)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("failed to connect: {0}")]
    Connect(String),
}

/// Opens transports to a notification endpoint.
///
/// The trait requires `Send + Sync` so a single connector can be shared by the
/// channel's reconnect timer and its driver task.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, endpoint: &Url) -> Result<TransportLink, TransportError>;
}
