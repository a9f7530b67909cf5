//! `stockwatch-channel`
//!
//! **Responsibility:** the client side of the real-time update channel.
//!
//! This crate provides:
//! - One logical connection per [`UpdateChannel`] with fixed-delay reconnects
//! - Envelope dispatch to handlers registered per event kind
//! - A transport seam with WebSocket and in-memory implementations
//!
//! The channel is a **thin notifier**: nothing is buffered, retried or replayed.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod memory;
pub mod status;
pub mod transport;
pub mod websocket;

pub use channel::{ChannelBuilder, SendError, UpdateChannel};
pub use config::{ChannelConfig, ConfigError, ReconnectPolicy};
pub use dispatch::{DispatchOutcome, Dispatcher, EnvelopeHandler};
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use status::ConnectionStatus;
pub use transport::{CloseInfo, Connector, OutboundFrame, TransportError, TransportEvent, TransportLink};
pub use websocket::WebSocketConnector;
