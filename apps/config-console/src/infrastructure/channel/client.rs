//! Pipeline Channel Client
//!
//! Maintains the single persistent WebSocket connection to the trading
//! decision pipeline. Decoded snapshot frames are delivered to the event
//! loop over an mpsc channel; outbound configuration-update frames are
//! accepted over a second mpsc channel and written to the socket.
//!
//! Reconnects with exponential backoff, sends a subscribe request on every
//! new connection, and keeps the link alive with periodic pings. Protocol
//! errors are reported as events and never tear the connection down: the
//! previous cache state stays untouched and the next good frame repairs the
//! picture.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{UpdateSink, UpdateSinkError};
use crate::domain::cache::EntityId;
use crate::domain::tree::ConfigTree;
use crate::infrastructure::channel::codec::ChannelCodec;
use crate::infrastructure::channel::messages::{
    ConfigUpdateFrame, InboundMessage, SubscribeFrame,
};
use crate::infrastructure::channel::reconnect::{Backoff, BackoffConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Events
// =============================================================================

/// Events delivered by the channel client.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection established and subscribe request sent.
    Connected,
    /// Connection lost; a reconnect will follow unless shutting down.
    Disconnected,
    /// About to retry the connection.
    Reconnecting {
        /// Retry count since the last successful connection.
        attempt: u32,
    },
    /// Validated snapshot trees, one per entity.
    Snapshot {
        /// Validated tree per entity.
        configs: HashMap<EntityId, ConfigTree>,
    },
    /// A frame was rejected at the codec boundary.
    ProtocolError(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Channel client configuration.
#[derive(Debug, Clone)]
pub struct ChannelClientConfig {
    /// WebSocket URL of the pipeline state feed.
    pub url: String,
    /// Interval between keep-alive pings.
    pub ping_interval: Duration,
    /// Reconnect backoff schedule.
    pub backoff: BackoffConfig,
}

impl ChannelClientConfig {
    /// Create a configuration with default timing for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(20),
            backoff: BackoffConfig::default(),
        }
    }
}

// =============================================================================
// Update Sink
// =============================================================================

/// [`UpdateSink`] adapter that queues outbound frames for the client task.
///
/// Frames queue while the connection is down and drain on reconnect; the
/// only failure mode is the client task having terminated.
#[derive(Debug, Clone)]
pub struct ChannelUpdateSink {
    tx: mpsc::Sender<ConfigUpdateFrame>,
}

impl ChannelUpdateSink {
    /// Wrap the outbound frame queue.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<ConfigUpdateFrame>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl UpdateSink for ChannelUpdateSink {
    async fn send_update(
        &self,
        entity: EntityId,
        changes: ConfigTree,
    ) -> Result<(), UpdateSinkError> {
        self.tx
            .send(ConfigUpdateFrame::new(entity, changes))
            .await
            .map_err(|_| UpdateSinkError::Disconnected)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Why a connection's streaming loop ended.
enum StreamEnd {
    /// Shutdown requested; do not reconnect.
    Cancelled,
    /// Socket closed or errored; reconnect.
    Lost,
}

/// The pipeline channel client task.
pub struct ChannelClient {
    config: ChannelClientConfig,
    codec: ChannelCodec,
    events: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<ConfigUpdateFrame>,
    cancel: CancellationToken,
}

impl ChannelClient {
    /// Create a client.
    #[must_use]
    pub const fn new(
        config: ChannelClientConfig,
        events: mpsc::Sender<ChannelEvent>,
        outbound: mpsc::Receiver<ConfigUpdateFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: ChannelCodec::new(),
            events,
            outbound,
            cancel,
        }
    }

    /// Run the connect/stream/reconnect loop until cancelled.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            match connect_async(self.config.url.as_str()).await {
                Ok((ws, _response)) => {
                    backoff.reset();
                    tracing::info!(url = %self.config.url, "channel connected");
                    let _ = self.events.send(ChannelEvent::Connected).await;

                    match self.stream(ws).await {
                        StreamEnd::Cancelled => return,
                        StreamEnd::Lost => {
                            tracing::warn!("channel disconnected");
                            let _ = self.events.send(ChannelEvent::Disconnected).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.url, error = %e, "channel connect failed");
                }
            }

            let delay = backoff.next_delay();
            let _ = self
                .events
                .send(ChannelEvent::Reconnecting {
                    attempt: backoff.attempt(),
                })
                .await;
            tracing::info!(
                attempt = backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "channel reconnect scheduled"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Stream one established connection until it ends.
    async fn stream(&mut self, mut ws: WsStream) -> StreamEnd {
        // Request state pushes for every instrument.
        match self.codec.encode(&SubscribeFrame::default()) {
            Ok(text) => {
                if let Err(e) = ws.send(Message::text(text)).await {
                    tracing::warn!(error = %e, "subscribe request failed");
                    return StreamEnd::Lost;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "subscribe frame encode failed");
                return StreamEnd::Lost;
            }
        }

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut outbound_open = true;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return StreamEnd::Cancelled;
                }

                _ = ping.tick() => {
                    if ws.send(Message::Ping(Bytes::new())).await.is_err() {
                        return StreamEnd::Lost;
                    }
                }

                frame = self.outbound.recv(), if outbound_open => {
                    match frame {
                        Some(frame) => {
                            if !self.send_update_frame(&mut ws, &frame).await {
                                return StreamEnd::Lost;
                            }
                        }
                        None => outbound_open = false,
                    }
                }

                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                        Some(Ok(Message::Ping(payload))) => {
                            if ws.send(Message::Pong(payload)).await.is_err() {
                                return StreamEnd::Lost;
                            }
                        }
                        Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Ok(Message::Binary(_))) => {
                            let _ = self
                                .events
                                .send(ChannelEvent::ProtocolError(
                                    "unexpected binary frame".to_string(),
                                ))
                                .await;
                        }
                        Some(Ok(Message::Close(_))) | None => return StreamEnd::Lost,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "channel read error");
                            return StreamEnd::Lost;
                        }
                    }
                }
            }
        }
    }

    /// Decode one text frame and forward the result as an event.
    async fn handle_text(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(InboundMessage::Snapshot { configs }) => {
                let _ = self.events.send(ChannelEvent::Snapshot { configs }).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "inbound frame rejected");
                let _ = self
                    .events
                    .send(ChannelEvent::ProtocolError(e.to_string()))
                    .await;
            }
        }
    }

    /// Write one update frame; returns `false` if the socket failed.
    async fn send_update_frame(&self, ws: &mut WsStream, frame: &ConfigUpdateFrame) -> bool {
        match self.codec.encode(frame) {
            Ok(text) => match ws.send(Message::text(text)).await {
                Ok(()) => {
                    tracing::debug!(symbol = %frame.symbol, "configuration update transmitted");
                    true
                }
                Err(e) => {
                    // Delivery is not guaranteed by contract; the frame is lost.
                    tracing::warn!(symbol = %frame.symbol, error = %e, "update transmit failed");
                    false
                }
            },
            Err(e) => {
                tracing::error!(symbol = %frame.symbol, error = %e, "update frame encode failed");
                true
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
