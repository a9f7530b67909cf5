//! The update channel: one logical connection, envelope dispatch, reconnects.
//!
//! ## Lifecycle
//!
//! ```text
//! connect() ──► Connecting ──open ok──► Connected ──unexpected close──► Disconnected
//!                  │                        │                               │
//!                  └──open failed───────────┼───────────────────────────────┤
//!                                           │                    attempts < max?
//!                                  disconnect() / clean close     yes: sleep(delay), connect
//!                                           ▼                     no:  give up
//!                                      Disconnected
//! ```
//!
//! Every connection attempt gets a new generation number. Tasks belonging to an
//! older generation (superseded by `disconnect()`) may still finish, but they
//! never install a transport or touch the status again, so one channel never
//! owns two live transports.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use stockwatch_events::{EventKind, ItemId, Subscription, UpdateEnvelope, WarehouseId};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ChannelConfig;
use crate::dispatch::{Dispatcher, EnvelopeHandler};
use crate::status::ConnectionStatus;
use crate::transport::{CloseInfo, Connector, OutboundFrame, TransportEvent};

#[derive(Debug, Error)]
pub enum SendError {
    /// Nothing was sent and nothing was queued.
    #[error("channel is not connected")]
    NotConnected,
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] stockwatch_events::EnvelopeError),
}

/// Builder: configuration plus the handlers registered up front.
pub struct ChannelBuilder {
    config: ChannelConfig,
    dispatcher: Dispatcher,
}

impl ChannelBuilder {
    /// Register a closure for one envelope kind (replacing an earlier one).
    pub fn on<F>(self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&UpdateEnvelope) + Send + Sync + 'static,
    {
        self.handler(kind, handler)
    }

    pub fn handler(mut self, kind: EventKind, handler: impl EnvelopeHandler) -> Self {
        self.dispatcher.register(kind, handler);
        self
    }

    pub fn build(self, connector: impl Connector) -> UpdateChannel {
        UpdateChannel::new(self.config, Arc::new(connector), self.dispatcher)
    }
}

/// Client side of the real-time update channel.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct UpdateChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    state: Mutex<State>,
    status: watch::Sender<ConnectionStatus>,
}

#[derive(Default)]
struct State {
    status: ConnectionStatus,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    reconnect_attempts: u32,
    /// Set by `disconnect()`; suppresses reconnects until the next `connect()`.
    manual_close: bool,
    reconnect_timer: Option<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
    warehouses: BTreeSet<WarehouseId>,
    items: BTreeSet<ItemId>,
}

impl State {
    fn subscription(&self) -> Subscription {
        Subscription {
            item_ids: self.items.iter().cloned().collect(),
            warehouse_ids: self.warehouses.iter().cloned().collect(),
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

impl UpdateChannel {
    pub fn builder(config: ChannelConfig) -> ChannelBuilder {
        ChannelBuilder {
            config,
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn new(config: ChannelConfig, connector: Arc<dyn Connector>, dispatcher: Dispatcher) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                dispatcher,
                state: Mutex::new(State::default()),
                status,
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Open the connection. No-op if one is open or being opened.
    ///
    /// A caller-initiated connect starts a fresh reconnect cycle, including
    /// after the channel gave up.
    ///
    /// Never blocks; the transport is opened on a spawned task, so this must be
    /// called from within a Tokio runtime.
    pub fn connect(&self) {
        if !self.shared.config.enabled {
            tracing::debug!("Update channel disabled by configuration; not connecting");
            return;
        }

        let mut state = self.shared.state.lock();
        state.manual_close = false;
        if !state.status.is_active() {
            state.reconnect_attempts = 0;
        }
        Shared::start_connect(&self.shared, &mut state);
    }

    /// Close the transport and stop reconnecting until `connect()` is called.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.manual_close = true;
        state.generation += 1;
        state.cancel_reconnect();

        if let Some(outbound) = state.outbound.take() {
            let _ = outbound.send(OutboundFrame::Close);
        }
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }

        if state.status != ConnectionStatus::Disconnected {
            tracing::info!("Update channel disconnected by caller");
        }
        self.shared.set_status(&mut state, ConnectionStatus::Disconnected);
    }

    /// Send one envelope if the transport is open.
    ///
    /// There is no outbox: a send while disconnected fails and is forgotten.
    pub fn send(&self, envelope: &UpdateEnvelope) -> Result<(), SendError> {
        let state = self.shared.state.lock();
        let outbound = match (&state.outbound, state.status) {
            (Some(outbound), ConnectionStatus::Connected) => outbound,
            _ => {
                tracing::debug!("Dropping {} envelope; channel is {}", envelope.kind(), state.status);
                return Err(SendError::NotConnected);
            }
        };

        let frame = envelope.to_frame()?;
        outbound
            .send(OutboundFrame::Text(frame))
            .map_err(|_| SendError::NotConnected)
    }

    /// Add warehouses to the watch set and announce it if connected.
    pub fn watch_warehouses<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<WarehouseId>,
    {
        let mut state = self.shared.state.lock();
        for id in ids {
            state.warehouses.insert(id.into());
        }
        Shared::announce(&state);
    }

    /// Add items to the watch set and announce it if connected.
    pub fn watch_items<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<ItemId>,
    {
        let mut state = self.shared.state.lock();
        for id in ids {
            state.items.insert(id.into());
        }
        Shared::announce(&state);
    }

    /// Remove items from the watch set; tells the endpoint when connected.
    pub fn unwatch_items<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<ItemId>,
    {
        let mut state = self.shared.state.lock();
        let mut removed = Vec::new();
        for id in ids {
            let id: ItemId = id.into();
            if state.items.remove(&id) {
                removed.push(id);
            }
        }

        if removed.is_empty() {
            return;
        }

        let payload = Subscription {
            item_ids: removed,
            warehouse_ids: Vec::new(),
        };
        Shared::send_locked(&state, EventKind::ItemUnsubscribe, &payload);
    }

    /// Current watch set, as it would be announced.
    pub fn subscription(&self) -> Subscription {
        self.shared.state.lock().subscription()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    /// Follow status transitions (for status indicators).
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Reconnect attempts made since the last successful open or manual `connect()`.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state.lock().reconnect_attempts
    }

    /// Whether a reconnect timer is currently scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.shared
            .state
            .lock()
            .reconnect_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl core::fmt::Debug for UpdateChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UpdateChannel")
            .field("endpoint", &self.shared.config.endpoint.as_str())
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    fn set_status(&self, state: &mut State, status: ConnectionStatus) {
        state.status = status;
        self.status.send_replace(status);
    }

    fn start_connect(shared: &Arc<Self>, state: &mut State) {
        if state.status.is_active() {
            tracing::debug!("Update channel already {}; connect ignored", state.status);
            return;
        }

        state.cancel_reconnect();
        state.generation += 1;
        let generation = state.generation;

        tracing::info!("Connecting update channel to {}", shared.config.endpoint);
        shared.set_status(state, ConnectionStatus::Connecting);

        let task = Arc::clone(shared);
        state.driver = Some(tokio::spawn(async move { task.run(generation).await }));
    }

    /// Drive one connection: open it, then dispatch frames until it closes.
    async fn run(self: Arc<Self>, generation: u64) {
        let link = match self.connector.open(&self.config.endpoint).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("Update channel failed to connect: {}", e);
                self.on_closed(generation, CloseInfo::abnormal(e.to_string()));
                return;
            }
        };

        let (outbound, mut inbound) = link.into_parts();

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                // Superseded while opening; dropping the link closes it.
                return;
            }
            state.outbound = Some(outbound);
            state.reconnect_attempts = 0;
            self.set_status(&mut state, ConnectionStatus::Connected);
            tracing::info!("Update channel connected to {}", self.config.endpoint);
            Self::announce(&state);
        }

        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Frame(frame) => {
                    self.dispatcher.dispatch_frame(&frame);
                }
                TransportEvent::Closed(info) => {
                    self.on_closed(generation, info);
                    return;
                }
            }
        }

        self.on_closed(generation, CloseInfo::abnormal("transport ended"));
    }

    /// Transport gone (or never opened): update status and apply the reconnect policy.
    fn on_closed(self: &Arc<Self>, generation: u64, info: CloseInfo) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }

        state.outbound = None;
        state.driver = None;
        self.set_status(&mut state, ConnectionStatus::Disconnected);

        if state.manual_close {
            return;
        }

        if info.clean {
            tracing::info!("Update channel closed by endpoint: {}", info.reason);
            return;
        }

        let policy = self.config.reconnect;
        if !policy.allows(state.reconnect_attempts) {
            tracing::warn!(
                "Update channel lost ({}); giving up after {} reconnect attempts",
                info.reason,
                state.reconnect_attempts
            );
            return;
        }

        state.reconnect_attempts += 1;
        tracing::warn!(
            "Update channel lost ({}); reconnect attempt {}/{} in {:?}",
            info.reason,
            state.reconnect_attempts,
            policy.max_attempts,
            policy.delay
        );

        let shared = Arc::clone(self);
        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(policy.delay).await;

            let mut state = shared.state.lock();
            // Detach ourselves so start_connect doesn't abort this task.
            state.reconnect_timer = None;
            if state.manual_close {
                return;
            }
            Self::start_connect(&shared, &mut state);
        }));
    }

    /// Send the watch set as an `item_subscribe` envelope, if connected and non-empty.
    fn announce(state: &State) {
        let subscription = state.subscription();
        if subscription.is_empty() {
            return;
        }
        Self::send_locked(state, EventKind::ItemSubscribe, &subscription);
    }

    fn send_locked(state: &State, kind: EventKind, payload: &Subscription) {
        let Some(outbound) = state.outbound.as_ref() else {
            return;
        };
        if !state.status.is_connected() {
            return;
        }

        let frame = UpdateEnvelope::new(kind, payload).and_then(|envelope| envelope.to_frame());
        match frame {
            Ok(frame) => {
                let _ = outbound.send(OutboundFrame::Text(frame));
            }
            Err(e) => tracing::warn!("Failed to encode {} announcement: {}", kind, e),
        }
    }
}
