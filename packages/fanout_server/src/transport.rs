//! WebSocket adapters for the hub's connection traits.
//!
//! An upgraded socket is split once: the sink half becomes the hub-owned
//! [`WsSender`], the stream half becomes the reader-owned [`WsReceiver`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use fanout_hub::{Connection, ConnectionError, Payload, PeerReceiver, PeerSender};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::config::TransportConfig;
use crate::metrics::ServerMetrics;
use crate::protocol;

pub type WsConnection = Connection<WsSender, WsReceiver>;

/// Wrap an upgraded socket as a hub connection.
pub fn ws_connection(
    socket: WebSocket,
    config: &TransportConfig,
    metrics: Arc<ServerMetrics>,
) -> WsConnection {
    let (sink, stream) = socket.split();
    Connection::new(
        WsSender { sink, closed: false },
        WsReceiver {
            stream,
            validate: config.validate_draw_events,
            metrics,
        },
    )
}

pub struct WsSender {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl PeerSender for WsSender {
    async fn send(&mut self, payload: Payload) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        let message = match payload {
            Payload::Text(text) => Message::Text(text.as_ref().into()),
            Payload::Binary(data) => Message::Binary(Bytes::copy_from_slice(&data)),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        // Sends a close frame, then shuts the socket down.
        if let Err(e) = self.sink.close().await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}

pub struct WsReceiver {
    stream: SplitStream<WebSocket>,
    validate: bool,
    metrics: Arc<ServerMetrics>,
}

impl WsReceiver {
    fn accept_frame(&self, frame: Payload) -> Result<Payload, ConnectionError> {
        if !self.validate {
            return Ok(frame);
        }
        match protocol::normalize(frame.as_bytes()) {
            Ok(json) => Ok(Payload::from(json)),
            Err(e) => {
                self.metrics.frame_rejected();
                Err(ConnectionError::Malformed(e.to_string()))
            }
        }
    }
}

impl PeerReceiver for WsReceiver {
    async fn recv(&mut self) -> Result<Payload, ConnectionError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => Payload::from(text.as_str()),
                Some(Ok(Message::Binary(data))) => Payload::from(data.to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(ConnectionError::Closed),
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            };
            let payload = self.accept_frame(frame)?;
            self.metrics.frame_received();
            return Ok(payload);
        }
    }
}
