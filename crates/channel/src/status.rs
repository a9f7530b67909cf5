//! Connection status of an update channel.

use serde::{Deserialize, Serialize};

/// Status indicator shown to users (connected / connecting / disconnected).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport; either never connected, dropped, or closed by the caller.
    #[default]
    Disconnected,
    /// A transport is being opened.
    Connecting,
    /// The transport is open and frames flow both ways.
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        *self == ConnectionStatus::Connected
    }

    /// Open or opening; a further `connect()` would be a no-op.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionStatus::Disconnected)
    }
}

impl core::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
