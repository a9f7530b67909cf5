//! `stockwatch`: watch inventory updates from the command line.
//!
//! Settings come from `STOCKWATCH_*` environment variables; every envelope is
//! logged, and stock alerts are raised as warn-level notices.

use std::time::Duration;

use stockwatch_channel::{ChannelConfig, ConfigError, UpdateChannel, WebSocketConnector};
use stockwatch_events::{EventKind, ItemId, UpdateEnvelope, UpdateEvent, WarehouseId};

/// Everything the watcher needs, resolved from the environment once.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub channel: ChannelConfig,
    pub warehouses: Vec<WarehouseId>,
    pub items: Vec<ItemId>,
    pub heartbeat: Option<Duration>,
}

impl WatchSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel = ChannelConfig::from_lookup(&lookup)?;

        let heartbeat = match lookup("STOCKWATCH_HEARTBEAT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "STOCKWATCH_HEARTBEAT_SECS",
                    value: raw.clone(),
                })?;
                // 0 turns heartbeats off.
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => Some(Duration::from_secs(30)),
        };

        Ok(Self {
            channel,
            warehouses: split_list(lookup("STOCKWATCH_WATCH_WAREHOUSES"))
                .map(WarehouseId::from)
                .collect(),
            items: split_list(lookup("STOCKWATCH_WATCH_ITEMS"))
                .map(ItemId::from)
                .collect(),
            heartbeat,
        })
    }
}

fn split_list(raw: Option<String>) -> impl Iterator<Item = String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_iter()
}

/// Build a channel that logs every known envelope kind.
pub fn build_channel(settings: &WatchSettings) -> UpdateChannel {
    let mut connector = WebSocketConnector::new();
    if let Some(interval) = settings.heartbeat {
        connector = connector.with_heartbeat(interval);
    }

    let mut builder = UpdateChannel::builder(settings.channel.clone());
    for kind in EventKind::ALL {
        builder = builder.on(kind, log_envelope);
    }

    let channel = builder.build(connector);
    channel.watch_warehouses(settings.warehouses.iter().cloned());
    channel.watch_items(settings.items.iter().cloned());
    channel
}

fn log_envelope(envelope: &UpdateEnvelope) {
    match envelope.decode() {
        Ok(event @ UpdateEvent::StockAlert(_)) => tracing::warn!("{}", describe(&event)),
        Ok(event @ UpdateEvent::Error(_)) => tracing::error!("{}", describe(&event)),
        Ok(event) => tracing::info!("{}", describe(&event)),
        Err(e) => tracing::warn!("Ignoring {} envelope: {}", envelope.kind(), e),
    }
}

/// One-line description of an event for the log.
pub fn describe(event: &UpdateEvent) -> String {
    match event {
        UpdateEvent::InventoryUpdate(u) => {
            let location = u
                .warehouse_id
                .as_ref()
                .map(|wh| format!(" in warehouse {wh}"))
                .unwrap_or_default();
            match u.delta() {
                Some(delta) => format!(
                    "Item {} now at {} ({delta:+}){location}",
                    u.item_id, u.quantity
                ),
                None => format!("Item {} now at {}{location}", u.item_id, u.quantity),
            }
        }
        UpdateEvent::StockAlert(a) => a.summary(),
        UpdateEvent::StockTransfer(t) => format!(
            "Transfer of {} x item {} from {} to {}{}",
            t.quantity,
            t.item_id,
            t.from_warehouse_id,
            t.to_warehouse_id,
            t.status
                .as_deref()
                .map(|s| format!(" ({s})"))
                .unwrap_or_default()
        ),
        UpdateEvent::WarehouseUpdate(w) => match (&w.name, w.active) {
            (Some(name), Some(false)) => format!("Warehouse {} ({name}) deactivated", w.warehouse_id),
            (Some(name), _) => format!("Warehouse {} ({name}) updated", w.warehouse_id),
            (None, Some(false)) => format!("Warehouse {} deactivated", w.warehouse_id),
            (None, _) => format!("Warehouse {} updated", w.warehouse_id),
        },
        UpdateEvent::Connection(c) => match (&c.client_id, &c.message) {
            (_, Some(message)) => format!("Endpoint says: {message}"),
            (Some(id), None) => format!("Registered as client {id}"),
            (None, None) => "Endpoint acknowledged connection".to_string(),
        },
        UpdateEvent::Error(e) => match &e.code {
            Some(code) => format!("Endpoint error {code}: {}", e.message),
            None => format!("Endpoint error: {}", e.message),
        },
        UpdateEvent::ItemSubscribe(s) => format!(
            "Subscribed to {} items, {} warehouses",
            s.item_ids.len(),
            s.warehouse_ids.len()
        ),
        UpdateEvent::ItemUnsubscribe(s) => format!("Unsubscribed from {} items", s.item_ids.len()),
        UpdateEvent::Capabilities(c) if c.features.is_empty() => {
            "Endpoint advertises no optional features".to_string()
        }
        UpdateEvent::Capabilities(c) => format!("Endpoint supports: {}", c.features.join(", ")),
        UpdateEvent::Unknown(_) => "Unrecognized envelope".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use stockwatch_events::{InventoryUpdate, StockTransfer, WarehouseUpdate};

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<WatchSettings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WatchSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn watch_lists_are_split_and_trimmed() {
        let s = settings(&[
            ("STOCKWATCH_WATCH_WAREHOUSES", " north, ,south "),
            ("STOCKWATCH_WATCH_ITEMS", "42"),
        ])
        .unwrap();

        assert_eq!(
            s.warehouses,
            vec![WarehouseId::from("north"), WarehouseId::from("south")]
        );
        assert_eq!(s.items, vec![ItemId::from("42")]);
    }

    #[test]
    fn heartbeat_defaults_and_can_be_disabled() {
        assert_eq!(settings(&[]).unwrap().heartbeat, Some(Duration::from_secs(30)));
        assert_eq!(
            settings(&[("STOCKWATCH_HEARTBEAT_SECS", "0")]).unwrap().heartbeat,
            None
        );
        assert!(matches!(
            settings(&[("STOCKWATCH_HEARTBEAT_SECS", "often")]),
            Err(ConfigError::InvalidValue { key: "STOCKWATCH_HEARTBEAT_SECS", .. })
        ));
    }

    #[test]
    fn channel_settings_come_from_the_same_environment() {
        let s = settings(&[("STOCKWATCH_ORIGIN", "https://erp.example.com")]).unwrap();
        assert_eq!(s.channel.endpoint.as_str(), "wss://erp.example.com/ws");
    }

    #[test]
    fn describes_inventory_updates_with_signed_delta() {
        let event = UpdateEvent::InventoryUpdate(InventoryUpdate {
            item_id: ItemId::from("sku-1"),
            warehouse_id: Some(WarehouseId::from("north")),
            quantity: 8,
            previous_quantity: Some(5),
            updated_at: None,
        });
        assert_eq!(describe(&event), "Item sku-1 now at 8 (+3) in warehouse north");
    }

    #[test]
    fn describes_transfers_and_warehouses() {
        let transfer = UpdateEvent::StockTransfer(StockTransfer {
            transfer_id: None,
            item_id: ItemId::from("sku-2"),
            from_warehouse_id: WarehouseId::from("north"),
            to_warehouse_id: WarehouseId::from("south"),
            quantity: 4,
            status: Some("in_transit".to_string()),
        });
        assert_eq!(
            describe(&transfer),
            "Transfer of 4 x item sku-2 from north to south (in_transit)"
        );

        let warehouse = UpdateEvent::WarehouseUpdate(WarehouseUpdate {
            warehouse_id: WarehouseId::from("east"),
            name: None,
            active: Some(false),
        });
        assert_eq!(describe(&warehouse), "Warehouse east deactivated");
    }
}
