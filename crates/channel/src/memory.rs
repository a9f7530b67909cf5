//! In-memory transport for tests/dev.
//!
//! A [`MemoryServer`] plays the notification endpoint. Every successful
//! [`MemoryConnector::open`] yields a [`MemoryPeer`] on the server side, through
//! which a test observes the frames the client sent, pushes frames to the
//! client, and ends the connection cleanly or abruptly.
//!
//! - No IO
//! - Records every open attempt, accepted or refused

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use stockwatch_events::UpdateEnvelope;
use tokio::sync::mpsc;
use url::Url;

use crate::transport::{
    CloseInfo, Connector, OutboundFrame, TransportError, TransportEvent, TransportLink,
};

#[derive(Debug)]
struct ServerState {
    accepting: AtomicBool,
    attempts: AtomicUsize,
    endpoints: Mutex<Vec<Url>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of the in-memory transport.
#[derive(Debug)]
pub struct MemoryServer {
    state: Arc<ServerState>,
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    pub fn new() -> Self {
        let (peers, incoming) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ServerState {
                accepting: AtomicBool::new(true),
                attempts: AtomicUsize::new(0),
                endpoints: Mutex::new(Vec::new()),
                peers,
            }),
            incoming,
        }
    }

    /// A connector whose transports terminate at this server.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            state: self.state.clone(),
        }
    }

    /// Refuse (or accept again) subsequent open attempts.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of open attempts so far, accepted or refused.
    pub fn open_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Endpoints requested by each attempt, in order.
    pub fn requested_endpoints(&self) -> Vec<Url> {
        self.state.endpoints.lock().clone()
    }

    /// Wait for the next accepted connection.
    pub async fn next_peer(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// An already-accepted connection, if any is waiting.
    pub fn try_next_peer(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Client side of the in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<ServerState>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &Url) -> Result<TransportLink, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        self.state.endpoints.lock().push(endpoint.clone());

        if !self.state.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Refused(endpoint.to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            received: out_rx,
            events: in_tx,
        };
        self.state
            .peers
            .send(peer)
            .map_err(|_| TransportError::Refused("server dropped".to_string()))?;

        Ok(TransportLink::new(out_tx, in_rx))
    }
}

/// Server end of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    received: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// Next frame written by the client; `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.received.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.received.try_recv().ok()
    }

    /// Next text frame from the client, parsed as an envelope.
    pub async fn recv_envelope(&mut self) -> Option<UpdateEnvelope> {
        match self.received.recv().await? {
            OutboundFrame::Text(text) => UpdateEnvelope::from_frame(&text).ok(),
            OutboundFrame::Close => None,
        }
    }

    /// Push raw text to the client. Returns `false` if the client is gone.
    pub fn push_raw(&self, frame: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Frame(frame.into())).is_ok()
    }

    pub fn push(&self, envelope: &UpdateEnvelope) -> bool {
        match envelope.to_frame() {
            Ok(frame) => self.push_raw(frame),
            Err(_) => false,
        }
    }

    /// End the connection from the server side.
    pub fn close(self, clean: bool) {
        let info = if clean {
            CloseInfo::clean("server closed")
        } else {
            CloseInfo::abnormal("connection lost")
        };
        let _ = self.events.send(TransportEvent::Closed(info));
    }

    /// Whether the client has released its end of the connection.
    pub fn is_client_gone(&self) -> bool {
        self.events.is_closed()
    }
}
