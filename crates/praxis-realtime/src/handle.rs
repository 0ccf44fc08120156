//! Connection handle and its supervised reconnect loop.
//!
//! A [`ConnectionHandle`] represents one live streaming connection. Its
//! supervisor task owns the underlying link: pushed messages fan out on a
//! broadcast channel, an interruption enters the bounded reconnect loop
//! (capped exponential backoff, same token), and an explicit
//! [`close`](ConnectionHandle::close) ends the handle without reconnecting.
//! Exhausting the reconnect budget is terminal for the handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use praxis_core::backoff_delay_with_random;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ConnectError;
use crate::registry::RealtimeConfig;
use crate::transport::{LinkEvent, Transport, TransportLink};

/// Size of the per-handle push fan-out channel.
const PUSH_BUFFER: usize = 64;

/// Transport state of one connection instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportPhase {
    /// Handshake in flight; the handle has not resolved yet.
    Connecting,
    /// Connection established and healthy.
    Open,
    /// Dropped after being open; the supervisor is re-handshaking.
    Reconnecting,
    /// Explicitly closed, or the reconnect budget is exhausted. Terminal.
    Closed,
}

/// One live streaming connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: String,
    token: String,
    attempts: AtomicU32,
    phase_tx: watch::Sender<TransportPhase>,
    close: CancellationToken,
    push_tx: broadcast::Sender<serde_json::Value>,
}

impl ConnectionHandle {
    fn new(token: String) -> Self {
        let (phase_tx, _rx) = watch::channel(TransportPhase::Connecting);
        let (push_tx, _rx) = broadcast::channel(PUSH_BUFFER);
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            token,
            attempts: AtomicU32::new(0),
            phase_tx,
            close: CancellationToken::new(),
            push_tx,
        }
    }

    /// Perform one handshake and, on success, hand the link to a
    /// supervisor task.
    ///
    /// Exactly one attempt: a rejection or timeout propagates to the
    /// caller. Retry policy applies only to connections that were open
    /// and then dropped.
    pub async fn establish(
        transport: Arc<dyn Transport>,
        config: RealtimeConfig,
        token: String,
    ) -> Result<Arc<Self>, ConnectError> {
        let handle = Arc::new(Self::new(token));
        let link = transport
            .connect(&config.endpoint, &handle.token, config.handshake_timeout)
            .await?;
        let _ = handle.attempts.fetch_add(1, Ordering::Relaxed);
        handle.set_phase(TransportPhase::Open);
        info!(connection = %handle.id, "streaming connection open");

        drop(tokio::spawn(supervise(
            handle.clone(),
            transport,
            config,
            link,
        )));
        Ok(handle)
    }

    /// Unique connection ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The token this connection authenticated with.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Total handshake attempts made for this handle (1-based).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Current transport phase snapshot.
    #[must_use]
    pub fn phase(&self) -> TransportPhase {
        *self.phase_tx.borrow()
    }

    /// Subscribe to phase transitions.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<TransportPhase> {
        self.phase_tx.subscribe()
    }

    /// Whether the connection is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase() == TransportPhase::Open
    }

    /// Subscribe to server-pushed messages.
    #[must_use]
    pub fn subscribe_pushes(&self) -> broadcast::Receiver<serde_json::Value> {
        self.push_tx.subscribe()
    }

    /// Close the connection and suppress any further reconnects.
    /// Idempotent.
    pub fn close(&self) {
        self.close.cancel();
    }

    fn set_phase(&self, phase: TransportPhase) {
        let _ = self.phase_tx.send_replace(phase);
    }
}

/// Own the link for the lifetime of the handle.
async fn supervise(
    handle: Arc<ConnectionHandle>,
    transport: Arc<dyn Transport>,
    config: RealtimeConfig,
    mut link: TransportLink,
) {
    loop {
        tokio::select! {
            () = handle.close.cancelled() => {
                link.close();
                handle.set_phase(TransportPhase::Closed);
                debug!(connection = %handle.id, "connection closed");
                break;
            }
            event = link.next_event() => match event {
                Some(LinkEvent::Message(value)) => {
                    // Lagging or absent subscribers are not an error.
                    let _ = handle.push_tx.send(value);
                }
                Some(LinkEvent::Interrupted { reason }) => {
                    warn!(connection = %handle.id, reason, "transport interrupted");
                    handle.set_phase(TransportPhase::Reconnecting);
                    match reconnect(&handle, transport.as_ref(), &config).await {
                        Some(new_link) => {
                            link = new_link;
                            handle.set_phase(TransportPhase::Open);
                            info!(
                                connection = %handle.id,
                                attempts = handle.attempts(),
                                "streaming connection re-established"
                            );
                        }
                        None => {
                            handle.set_phase(TransportPhase::Closed);
                            break;
                        }
                    }
                }
                None => {
                    // The pump ended without an interruption event; only an
                    // explicit close does that.
                    handle.set_phase(TransportPhase::Closed);
                    break;
                }
            }
        }
    }
}

/// Bounded re-handshake loop. Returns the new link, or `None` once the
/// budget is exhausted or the handle was closed mid-retry.
async fn reconnect(
    handle: &ConnectionHandle,
    transport: &dyn Transport,
    config: &RealtimeConfig,
) -> Option<TransportLink> {
    for attempt in 0..config.reconnect.max_attempts {
        let delay = backoff_delay_with_random(attempt, &config.reconnect, rand::random());
        tokio::select! {
            () = handle.close.cancelled() => return None,
            () = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }

        let total = handle.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(connection = %handle.id, attempt = total, delay_ms = delay, "reconnect attempt");
        match transport
            .connect(&config.endpoint, &handle.token, config.handshake_timeout)
            .await
        {
            Ok(link) => return Some(link),
            Err(e) => warn!(connection = %handle.id, error = %e, "reconnect attempt failed"),
        }
    }
    warn!(
        connection = %handle.id,
        budget = config.reconnect.max_attempts,
        "reconnect budget exhausted, connection is terminal"
    );
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use praxis_core::BackoffConfig;

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            endpoint: "ws://test/realtime".to_string(),
            handshake_timeout: Duration::from_secs(5),
            reconnect: BackoffConfig::default(),
        }
    }

    fn config_with_budget(max_attempts: u32) -> RealtimeConfig {
        RealtimeConfig {
            reconnect: BackoffConfig {
                max_attempts,
                ..BackoffConfig::default()
            },
            ..config()
        }
    }

    #[tokio::test]
    async fn establish_opens_and_counts_one_attempt() {
        let transport = Arc::new(MockTransport::new());
        let handle = ConnectionHandle::establish(transport.clone(), config(), "T1".into())
            .await
            .unwrap();

        assert_eq!(handle.phase(), TransportPhase::Open);
        assert!(handle.is_open());
        assert_eq!(handle.attempts(), 1);
        assert_eq!(handle.token(), "T1");
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.tokens(), vec!["T1".to_string()]);
    }

    #[tokio::test]
    async fn establish_propagates_handshake_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.script_failure("401");
        let result = ConnectionHandle::establish(transport, config(), "T1".into()).await;
        assert_eq!(
            result.unwrap_err(),
            ConnectError::HandshakeFailed {
                reason: "401".into()
            }
        );
    }

    #[tokio::test]
    async fn close_is_terminal_and_suppresses_reconnect() {
        let transport = Arc::new(MockTransport::new());
        let handle = ConnectionHandle::establish(transport.clone(), config(), "T1".into())
            .await
            .unwrap();

        let mut phase = handle.watch_phase();
        handle.close();
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();
        // No re-handshake happened.
        assert_eq!(transport.connect_count(), 1);
        // The underlying link was told to close.
        assert!(transport.link(0).is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_enters_reconnecting_then_reopens() {
        let transport = Arc::new(MockTransport::new());
        let handle = ConnectionHandle::establish(transport.clone(), config(), "T1".into())
            .await
            .unwrap();

        let mut phase = handle.watch_phase();
        transport.link(0).interrupt("network flap").await;
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Reconnecting)
            .await
            .unwrap();
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Open)
            .await
            .unwrap();

        assert_eq!(handle.attempts(), 2);
        // Reconnect reuses the token it authenticated with.
        assert_eq!(transport.tokens(), vec!["T1".to_string(), "T1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_is_terminal() {
        let transport = Arc::new(MockTransport::new());
        let handle =
            ConnectionHandle::establish(transport.clone(), config_with_budget(2), "T1".into())
                .await
                .unwrap();

        transport.script_failure("down");
        transport.script_failure("down");
        let mut phase = handle.watch_phase();
        transport.link(0).interrupt("lost").await;
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();

        // 1 establish + 2 failed reconnects, nothing after the budget.
        assert_eq!(handle.attempts(), 3);
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_backoff_stops_retrying() {
        let transport = Arc::new(MockTransport::new());
        let handle =
            ConnectionHandle::establish(transport.clone(), config_with_budget(5), "T1".into())
                .await
                .unwrap();

        let mut phase = handle.watch_phase();
        transport.link(0).interrupt("lost").await;
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Reconnecting)
            .await
            .unwrap();

        handle.close();
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();
        // No reconnect attempt went through after the close.
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn pushed_messages_fan_out() {
        let transport = Arc::new(MockTransport::new());
        let handle = ConnectionHandle::establish(transport.clone(), config(), "T1".into())
            .await
            .unwrap();

        let mut pushes = handle.subscribe_pushes();
        transport
            .link(0)
            .push(serde_json::json!({"kind": "notification.created"}))
            .await;

        let value = pushes.recv().await.unwrap();
        assert_eq!(value["kind"], "notification.created");
    }

    #[test]
    fn handle_ids_are_unique() {
        let a = ConnectionHandle::new("T1".into());
        let b = ConnectionHandle::new("T1".into());
        assert_ne!(a.id(), b.id());
    }
}
