//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each open spawns two tasks: a writer that drains the outbound queue (and
//! sends heartbeat pings when configured), and a reader that forwards text
//! frames inbound. Binary frames are ignored; only text framing is defined.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::transport::{
    CloseInfo, Connector, OutboundFrame, TransportError, TransportEvent, TransportLink,
};

#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    heartbeat: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a ping every `interval` while the connection is open.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &Url) -> Result<TransportLink, TransportError> {
        let (stream, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("{endpoint}: {e}")))?;

        tracing::debug!("WebSocket open to {}", endpoint);

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let mut heartbeat = self.heartbeat.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = out_rx.recv() => match frame {
                        Some(OutboundFrame::Text(text)) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                tracing::debug!("WebSocket write failed: {}", e);
                                break;
                            }
                        }
                        // Explicit close, or the channel released the link.
                        Some(OutboundFrame::Close) | None => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            let _ = sink.close().await;
                            break;
                        }
                    },
                    _ = next_tick(&mut heartbeat) => {
                        if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                            tracing::debug!("WebSocket heartbeat failed: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text.to_string()),
                    Ok(Message::Close(frame)) => {
                        let info = match frame {
                            Some(f) => CloseInfo::from_code(u16::from(f.code), f.reason.to_string()),
                            None => CloseInfo::clean("closed without status"),
                        };
                        let _ = in_tx.send(TransportEvent::Closed(info));
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Closed(CloseInfo::abnormal(e.to_string())));
                        return;
                    }
                };

                if in_tx.send(event).is_err() {
                    // The channel dropped this link.
                    return;
                }
            }

            let _ = in_tx.send(TransportEvent::Closed(CloseInfo::abnormal("stream ended")));
        });

        Ok(TransportLink::new(out_tx, in_rx))
    }
}

async fn next_tick(heartbeat: &mut Option<tokio::time::Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
