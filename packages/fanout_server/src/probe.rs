//! End-to-end check against a running server: two clients connect, the first
//! draws, and the second must see the stroke before the deadline.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tracing::debug;

use crate::protocol::DrawEvent;

/// How often the first client repeats its stroke while waiting.
///
/// The second client may still be registering when the first stroke goes out,
/// and a fan-out only reaches members present at the time.
const RESEND_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("server is unavailable")]
    Unavailable,

    #[error("no broadcast received within {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Time from the first send to the second client's receipt
    pub latency: Duration,
    /// Strokes sent before one got through
    pub attempts: u32,
    pub event: DrawEvent,
}

/// Connect two clients to `url` and verify a stroke sent by one reaches the
/// other within `wait`.
pub async fn run_probe(url: &str, wait: Duration) -> Result<ProbeReport, ProbeError> {
    let (first, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(ProbeError::from_tungstenite)?;
    let (second, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(ProbeError::from_tungstenite)?;
    debug!(url, "Probe clients connected");

    let event = DrawEvent::segment((90.0, 90.0), (100.0, 100.0), "#000000");
    let json = serde_json::to_string(&event).map_err(anyhow::Error::from)?;

    let (mut first_tx, _first_rx) = first.split();
    let (mut second_tx, mut second_rx) = second.split();

    let started = Instant::now();
    let mut attempts: u32 = 0;
    let exchange = async {
        let mut resend = tokio::time::interval(RESEND_INTERVAL);
        loop {
            tokio::select! {
                _ = resend.tick() => {
                    let stroke = tungstenite::Message::Text(json.clone().into());
                    if let Err(e) = first_tx.send(stroke).await {
                        return Err(ProbeError::Other(e.into()));
                    }
                    attempts += 1;
                }
                msg = second_rx.next() => match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match serde_json::from_str::<DrawEvent>(text.as_str()) {
                            Ok(received) if received == event => return Ok(()),
                            // Someone else's traffic on a shared server.
                            _ => {}
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        return Err(ProbeError::Other(anyhow::anyhow!(
                            "server closed the connection"
                        )));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ProbeError::Other(e.into())),
                },
            }
        }
    };

    let outcome = match tokio::time::timeout(wait, exchange).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::TimedOut(wait)),
    };
    let latency = started.elapsed();

    let _ = first_tx.close().await;
    let _ = second_tx.close().await;

    outcome.map(|()| ProbeReport {
        latency,
        attempts,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::WebSocketUpgrade;
    use axum::routing::get;

    /// A WebSocket endpoint that accepts clients and never relays anything.
    async fn spawn_silent_server() -> String {
        let app = Router::new().route(
            "/ws",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|mut socket| async move {
                    while let Some(Ok(_)) = socket.recv().await {}
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{}/ws", addr)
    }

    #[tokio::test]
    async fn test_probe_reports_unavailable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = run_probe(&format!("ws://{}/ws", addr), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable), "got {err:?}");
    }

    #[tokio::test]
    async fn test_probe_times_out_without_relay() {
        let url = spawn_silent_server().await;
        let err = run_probe(&url, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::TimedOut(d) if d == Duration::from_millis(300)));
    }

    #[test]
    fn test_non_connect_errors_are_other() {
        let err = ProbeError::from_tungstenite(tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, ProbeError::Other(_)));
    }
}
