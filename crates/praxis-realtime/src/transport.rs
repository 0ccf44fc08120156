//! Streaming transport contract and the production WebSocket implementation.
//!
//! A [`Transport`] performs exactly one authenticated handshake per
//! `connect` call — the retry policy lives above it, in the connection
//! handle's supervisor. This keeps the transport a black box with an
//! explicit contract instead of an invisible background reconnector.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ConnectError;

/// Size of the per-link event channel.
const LINK_EVENT_BUFFER: usize = 64;

/// Events emitted by an established link.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// A server-pushed message (already parsed JSON).
    Message(serde_json::Value),
    /// The connection dropped for a reason other than an explicit close.
    Interrupted {
        /// Transport-reported cause.
        reason: String,
    },
}

/// One established streaming connection.
///
/// Events arrive on an internal channel; [`close`](Self::close) shuts the
/// link down and suppresses any further events.
#[derive(Debug)]
pub struct TransportLink {
    events: mpsc::Receiver<LinkEvent>,
    closer: CancellationToken,
}

impl TransportLink {
    /// Assemble a link from its event channel and close signal.
    #[must_use]
    pub fn new(events: mpsc::Receiver<LinkEvent>, closer: CancellationToken) -> Self {
        Self { events, closer }
    }

    /// Receive the next link event. `None` means the link is gone.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Close the link. Idempotent; no `Interrupted` event follows.
    pub fn close(&self) {
        self.closer.cancel();
    }
}

/// One handshake attempt in, one link or one error out.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a single authenticated connection to `endpoint`.
    ///
    /// The attempt must resolve within `handshake_timeout`; an attempt
    /// that hangs is reported as [`ConnectError::HandshakeTimeout`] so a
    /// pending handshake can never block state transitions indefinitely.
    async fn connect(
        &self,
        endpoint: &str,
        token: &str,
        handshake_timeout: Duration,
    ) -> Result<TransportLink, ConnectError>;
}

/// Production transport over `tokio-tungstenite`.
///
/// Authenticates at handshake time with an `Authorization: Bearer` header
/// and pumps text frames into [`LinkEvent::Message`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create the production transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[allow(clippy::cast_possible_truncation)]
    async fn connect(
        &self,
        endpoint: &str,
        token: &str,
        handshake_timeout: Duration,
    ) -> Result<TransportLink, ConnectError> {
        let mut request =
            endpoint
                .into_client_request()
                .map_err(|e| ConnectError::HandshakeFailed {
                    reason: format!("invalid endpoint: {e}"),
                })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ConnectError::HandshakeFailed {
                reason: "token is not a valid header value".to_string(),
            }
        })?;
        let _ = request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, response) = tokio::time::timeout(handshake_timeout, connect_async(request))
            .await
            .map_err(|_| ConnectError::HandshakeTimeout {
                timeout_ms: handshake_timeout.as_millis() as u64,
            })?
            .map_err(|e| ConnectError::HandshakeFailed {
                reason: e.to_string(),
            })?;
        debug!(endpoint, status = %response.status(), "websocket handshake accepted");

        let (mut sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::channel(LINK_EVENT_BUFFER);
        let closer = CancellationToken::new();
        let pump_closer = closer.clone();

        // Read pump: translates frames into link events until the link is
        // closed from either side.
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = pump_closer.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str(&text) {
                                Ok(value) => {
                                    let _ = tx.send(LinkEvent::Message(value)).await;
                                }
                                Err(e) => warn!(error = %e, "dropping unparseable frame"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = tx
                                .send(LinkEvent::Interrupted {
                                    reason: "closed by server".to_string(),
                                })
                                .await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = tx
                                .send(LinkEvent::Interrupted {
                                    reason: e.to_string(),
                                })
                                .await;
                            break;
                        }
                    }
                }
            }
        }));

        Ok(TransportLink::new(rx, closer))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_delivers_events_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let mut link = TransportLink::new(rx, CancellationToken::new());

        tx.send(LinkEvent::Message(serde_json::json!({"seq": 1})))
            .await
            .unwrap();
        tx.send(LinkEvent::Interrupted {
            reason: "eof".into(),
        })
        .await
        .unwrap();

        match link.next_event().await.unwrap() {
            LinkEvent::Message(v) => assert_eq!(v["seq"], 1),
            LinkEvent::Interrupted { .. } => panic!("expected message first"),
        }
        assert!(matches!(
            link.next_event().await.unwrap(),
            LinkEvent::Interrupted { .. }
        ));
    }

    #[tokio::test]
    async fn link_ends_when_sender_dropped() {
        let (tx, rx) = mpsc::channel(8);
        let mut link = TransportLink::new(rx, CancellationToken::new());
        drop(tx);
        assert!(link.next_event().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (_tx, rx) = mpsc::channel(8);
        let closer = CancellationToken::new();
        let link = TransportLink::new(rx, closer.clone());
        link.close();
        link.close();
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn ws_connect_to_unroutable_endpoint_fails_handshake() {
        let transport = WsTransport::new();
        // Nothing listens on this port; connect should fail, not hang.
        let result = transport
            .connect("ws://127.0.0.1:1/realtime", "tok", Duration::from_secs(5))
            .await;
        assert!(matches!(
            result.unwrap_err(),
            ConnectError::HandshakeFailed { .. } | ConnectError::HandshakeTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn ws_connect_rejects_invalid_endpoint() {
        let transport = WsTransport::new();
        let result = transport
            .connect("not a url", "tok", Duration::from_secs(1))
            .await;
        assert!(matches!(
            result.unwrap_err(),
            ConnectError::HandshakeFailed { .. }
        ));
    }
}
