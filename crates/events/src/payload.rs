//! Typed payloads for the known envelope kinds.
//!
//! Optional fields default when absent so that servers emitting a compatible
//! subset still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::UpdateEnvelope;
use crate::error::EnvelopeError;
use crate::id::{ItemId, WarehouseId};
use crate::kind::EventKind;

/// Payload: inventory_update. The stock level of an item changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub item_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl InventoryUpdate {
    /// Signed change relative to the previous quantity, when known and
    /// representable.
    pub fn delta(&self) -> Option<i64> {
        self.previous_quantity
            .and_then(|prev| self.quantity.checked_sub(prev))
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[default]
    Low,
    Critical,
    OutOfStock,
}

/// Payload: stock_alert. An item crossed its reorder threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub item_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
    pub current_quantity: i64,
    pub threshold: i64,
    #[serde(default)]
    pub severity: AlertSeverity,
}

impl StockAlert {
    /// Short human-readable text for a transient notification.
    pub fn summary(&self) -> String {
        let name = self
            .item_name
            .as_deref()
            .map(str::to_string)
            .unwrap_or_else(|| format!("item {}", self.item_id));

        let headline = match self.severity {
            AlertSeverity::OutOfStock => "Out of stock",
            AlertSeverity::Critical => "Critically low stock",
            AlertSeverity::Low => "Low stock",
        };

        match &self.warehouse_id {
            Some(wh) => format!(
                "{headline}: {name} ({} left, threshold {}) in warehouse {wh}",
                self.current_quantity, self.threshold
            ),
            None => format!(
                "{headline}: {name} ({} left, threshold {})",
                self.current_quantity, self.threshold
            ),
        }
    }
}

/// Payload: stock_transfer. Stock moved between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransfer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    pub item_id: ItemId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Payload: warehouse_update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseUpdate {
    pub warehouse_id: WarehouseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Payload: connection. Greeting sent by the endpoint after the upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload: error. Reported by the endpoint; informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Payload: item_subscribe / item_unsubscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
    #[serde(default)]
    pub warehouse_ids: Vec<WarehouseId>,
}

impl Subscription {
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty() && self.warehouse_ids.is_empty()
    }
}

/// Payload: capabilities. Features the endpoint advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub features: Vec<String>,
}

impl Capabilities {
    pub fn supports(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Typed view of an envelope, keyed on its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    InventoryUpdate(InventoryUpdate),
    StockAlert(StockAlert),
    StockTransfer(StockTransfer),
    WarehouseUpdate(WarehouseUpdate),
    Connection(ConnectionNotice),
    Error(ErrorNotice),
    ItemSubscribe(Subscription),
    ItemUnsubscribe(Subscription),
    Capabilities(Capabilities),
    Unknown(Value),
}

impl UpdateEvent {
    pub fn from_envelope(envelope: &UpdateEnvelope) -> Result<Self, EnvelopeError> {
        // A bare `{"type":"connection"}` carries a null payload.
        let bare = envelope.payload().is_null();

        Ok(match envelope.kind() {
            EventKind::InventoryUpdate => Self::InventoryUpdate(envelope.decode_payload()?),
            EventKind::StockAlert => Self::StockAlert(envelope.decode_payload()?),
            EventKind::StockTransfer => Self::StockTransfer(envelope.decode_payload()?),
            EventKind::WarehouseUpdate => Self::WarehouseUpdate(envelope.decode_payload()?),
            EventKind::Connection if bare => {
                Self::Connection(ConnectionNotice::default())
            }
            EventKind::Connection => Self::Connection(envelope.decode_payload()?),
            EventKind::Error => Self::Error(envelope.decode_payload()?),
            EventKind::ItemSubscribe => Self::ItemSubscribe(envelope.decode_payload()?),
            EventKind::ItemUnsubscribe => Self::ItemUnsubscribe(envelope.decode_payload()?),
            EventKind::Capabilities if bare => {
                Self::Capabilities(Capabilities::default())
            }
            EventKind::Capabilities => Self::Capabilities(envelope.decode_payload()?),
            EventKind::Unknown => Self::Unknown(envelope.payload().clone()),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::InventoryUpdate(_) => EventKind::InventoryUpdate,
            Self::StockAlert(_) => EventKind::StockAlert,
            Self::StockTransfer(_) => EventKind::StockTransfer,
            Self::WarehouseUpdate(_) => EventKind::WarehouseUpdate,
            Self::Connection(_) => EventKind::Connection,
            Self::Error(_) => EventKind::Error,
            Self::ItemSubscribe(_) => EventKind::ItemSubscribe,
            Self::ItemUnsubscribe(_) => EventKind::ItemUnsubscribe,
            Self::Capabilities(_) => EventKind::Capabilities,
            Self::Unknown(_) => EventKind::Unknown,
        }
    }
}
