//! `stockwatch-events`: the update envelope and the inventory event payloads
//! carried inside it.
//!
//! Envelopes are transient: they are built by whichever side observed a change,
//! consumed by the receiving side's dispatcher, and then dropped.

pub mod envelope;
pub mod error;
pub mod id;
pub mod kind;
pub mod payload;

pub use envelope::UpdateEnvelope;
pub use error::EnvelopeError;
pub use id::{ItemId, WarehouseId};
pub use kind::EventKind;
pub use payload::{
    AlertSeverity, Capabilities, ConnectionNotice, ErrorNotice, InventoryUpdate, StockAlert,
    StockTransfer, Subscription, UpdateEvent, WarehouseUpdate,
};
