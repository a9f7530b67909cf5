//! WebSocket transport against a real endpoint bound to an ephemeral port.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::json;
use stockwatch_channel::{
    ChannelConfig, ConnectionStatus, ReconnectPolicy, UpdateChannel, WebSocketConnector,
};
use stockwatch_events::{EventKind, UpdateEnvelope, UpdateEvent};
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug)]
enum Seen {
    Text(String),
    Close(Option<u16>),
}

#[derive(Clone)]
struct EndpointState {
    seen: mpsc::UnboundedSender<Seen>,
    sessions: Arc<AtomicUsize>,
    /// Drop the first session without a closing handshake.
    drop_first: bool,
}

struct TestEndpoint {
    origin: Url,
    seen: mpsc::UnboundedReceiver<Seen>,
    sessions: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestEndpoint {
    async fn spawn(drop_first: bool) -> Self {
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let sessions = Arc::new(AtomicUsize::new(0));
        let state = EndpointState {
            seen: seen_tx,
            sessions: sessions.clone(),
            drop_first,
        };

        let app = Router::new().route("/ws", get(upgrade)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            origin: Url::parse(&format!("http://{addr}")).unwrap(),
            seen,
            sessions,
            handle,
        }
    }

    async fn next_seen(&mut self) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), self.seen.recv())
            .await
            .expect("endpoint saw nothing")
            .expect("endpoint dropped")
    }
}

impl Drop for TestEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<EndpointState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(mut socket: WebSocket, state: EndpointState) {
    let n = state.sessions.fetch_add(1, Ordering::SeqCst);
    if state.drop_first && n == 0 {
        return;
    }

    let greeting = json!({"type": "connection", "payload": {"client_id": format!("c{n}")}});
    let alert = json!({
        "type": "stock_alert",
        "sequence": 1,
        "payload": {
            "item_id": 5,
            "item_name": "Pallet wrap",
            "current_quantity": 1,
            "threshold": 4,
            "severity": "critical"
        }
    });
    for frame in [greeting, alert] {
        if socket.send(Message::Text(frame.to_string())).await.is_err() {
            return;
        }
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let _ = state.seen.send(Seen::Text(text));
            }
            Message::Close(frame) => {
                let _ = state.seen.send(Seen::Close(frame.map(|f| f.code)));
                break;
            }
            _ => {}
        }
    }
}

fn channel_for(
    endpoint: &TestEndpoint,
    events: mpsc::UnboundedSender<UpdateEnvelope>,
) -> UpdateChannel {
    let config = ChannelConfig::for_origin(&endpoint.origin)
        .unwrap()
        .with_reconnect(ReconnectPolicy::new(Duration::from_millis(50), 3));

    let alerts = events.clone();
    UpdateChannel::builder(config)
        .on(EventKind::Connection, move |envelope: &UpdateEnvelope| {
            let _ = events.send(envelope.clone());
        })
        .on(EventKind::StockAlert, move |envelope: &UpdateEnvelope| {
            let _ = alerts.send(envelope.clone());
        })
        .build(WebSocketConnector::new().with_heartbeat(Duration::from_secs(10)))
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<UpdateEnvelope>) -> UpdateEnvelope {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no envelope dispatched")
        .expect("handlers dropped")
}

#[tokio::test]
async fn frames_flow_both_ways_and_disconnect_closes_normally() {
    let mut endpoint = TestEndpoint::spawn(false).await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let channel = channel_for(&endpoint, tx);
    assert_eq!(channel.config().endpoint.scheme(), "ws");

    channel.connect();

    let greeting = next_event(&mut events).await;
    assert_eq!(greeting.kind(), EventKind::Connection);

    let alert = next_event(&mut events).await;
    assert_eq!(alert.sequence(), Some(1));
    match alert.decode().unwrap() {
        UpdateEvent::StockAlert(a) => {
            assert_eq!(a.item_id.as_str(), "5");
            assert_eq!(
                a.summary(),
                "Critically low stock: Pallet wrap (1 left, threshold 4)"
            );
        }
        other => panic!("expected StockAlert, got {other:?}"),
    }
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    let update = UpdateEnvelope::new(
        EventKind::InventoryUpdate,
        json!({"item_id": "sku-7", "quantity": 30}),
    )
    .unwrap();
    channel.send(&update).unwrap();

    match endpoint.next_seen().await {
        Seen::Text(text) => assert_eq!(UpdateEnvelope::from_frame(&text).unwrap(), update),
        other => panic!("expected text frame, got {other:?}"),
    }

    channel.disconnect();
    match endpoint.next_seen().await {
        Seen::Close(code) => assert_eq!(code, Some(1000)),
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn dropped_connection_is_reestablished() {
    let endpoint = TestEndpoint::spawn(true).await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let channel = channel_for(&endpoint, tx);

    channel.connect();

    // First session is dropped without a close frame; the greeting can only
    // come from the reconnect.
    let greeting = next_event(&mut events).await;
    assert_eq!(greeting.payload()["client_id"], "c1");
    assert_eq!(endpoint.sessions.load(Ordering::SeqCst), 2);

    let mut changes = channel.status_changes();
    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        changes.wait_for(|s| s.is_connected()),
    )
    .await
    .expect("never reconnected");
    assert_eq!(channel.reconnect_attempts(), 0);

    channel.disconnect();
}

#[tokio::test]
async fn unreachable_endpoint_gives_up_after_max_attempts() {
    // Bind then drop to obtain a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ChannelConfig::for_origin(&Url::parse(&format!("http://{addr}")).unwrap())
        .unwrap()
        .with_reconnect(ReconnectPolicy::new(Duration::from_millis(20), 2));
    let channel = UpdateChannel::builder(config).build(WebSocketConnector::new());

    channel.connect();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
    assert_eq!(channel.reconnect_attempts(), 2);
    assert!(!channel.reconnect_pending());
}
