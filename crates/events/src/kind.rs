//! The fixed set of envelope kinds.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Envelope `type` discriminator.
///
/// Unrecognized strings deserialize to [`EventKind::Unknown`] so that a frame
/// from a newer server still parses; the dispatcher simply has no handler for it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InventoryUpdate,
    StockAlert,
    StockTransfer,
    WarehouseUpdate,
    Connection,
    Error,
    ItemSubscribe,
    ItemUnsubscribe,
    Capabilities,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Every kind with a defined meaning (excludes `Unknown`).
    pub const ALL: [EventKind; 9] = [
        EventKind::InventoryUpdate,
        EventKind::StockAlert,
        EventKind::StockTransfer,
        EventKind::WarehouseUpdate,
        EventKind::Connection,
        EventKind::Error,
        EventKind::ItemSubscribe,
        EventKind::ItemUnsubscribe,
        EventKind::Capabilities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InventoryUpdate => "inventory_update",
            EventKind::StockAlert => "stock_alert",
            EventKind::StockTransfer => "stock_transfer",
            EventKind::WarehouseUpdate => "warehouse_update",
            EventKind::Connection => "connection",
            EventKind::Error => "error",
            EventKind::ItemSubscribe => "item_subscribe",
            EventKind::ItemUnsubscribe => "item_unsubscribe",
            EventKind::Capabilities => "capabilities",
            EventKind::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown)
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = core::convert::Infallible;

    /// Never fails; anything unrecognized becomes `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .unwrap_or(EventKind::Unknown))
    }
}
