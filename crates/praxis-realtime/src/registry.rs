//! Single-connection registry with request coalescing.
//!
//! The registry owns the process's one connection slot. Concurrent
//! `acquire` calls with a connect already in flight join that attempt
//! instead of starting a second handshake: the in-flight future is
//! stored under the lock before its first suspension point, so a
//! duplicate handshake is unrepresentable.
//!
//! The registry is an explicitly owned, injectable instance — production
//! wiring constructs exactly one per process, tests construct as many
//! isolated ones as they need.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use praxis_core::BackoffConfig;
use praxis_settings::RealtimeSettings;
use tracing::debug;

use crate::errors::ConnectError;
use crate::handle::{ConnectionHandle, TransportPhase};
use crate::transport::Transport;

/// Connection parameters shared by every handshake the registry issues.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the realtime service.
    pub endpoint: String,
    /// Bound on a pending handshake.
    pub handshake_timeout: Duration,
    /// Reconnection policy for dropped connections.
    pub reconnect: BackoffConfig,
}

impl RealtimeConfig {
    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &RealtimeSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            handshake_timeout: Duration::from_millis(settings.handshake_timeout_ms),
            reconnect: settings.reconnect.clone(),
        }
    }
}

type ConnectFuture = Shared<BoxFuture<'static, Result<Arc<ConnectionHandle>, ConnectError>>>;

#[derive(Default)]
struct RegistryInner {
    current: Option<Arc<ConnectionHandle>>,
    inflight: Option<ConnectFuture>,
    /// Bumped by every `release`; an attempt that resolves under a newer
    /// epoch is closed instead of adopted.
    epoch: u64,
}

/// Guarantees at most one live streaming connection per instance.
pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    config: RealtimeConfig,
    inner: Arc<Mutex<RegistryInner>>,
}

impl ConnectionRegistry {
    /// Create a registry over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: RealtimeConfig) -> Self {
        Self {
            transport,
            config,
            inner: Arc::new(Mutex::new(RegistryInner::default())),
        }
    }

    /// Acquire the shared connection, authenticating with `token`.
    ///
    /// Idempotent for a live handle; coalescing for an in-flight attempt;
    /// otherwise performs exactly one handshake. A `token` the caller
    /// knows to be stale must be preceded by [`release`](Self::release) —
    /// the registry never compares tokens.
    pub async fn acquire(&self, token: &str) -> Result<Arc<ConnectionHandle>, ConnectError> {
        if token.is_empty() {
            return Err(ConnectError::AuthRequired);
        }

        let attempt = {
            let mut inner = self.inner.lock();
            if let Some(current) = &inner.current {
                if current.phase() != TransportPhase::Closed {
                    return Ok(current.clone());
                }
                // A terminal handle does not hold the slot.
                inner.current = None;
            }
            if let Some(inflight) = &inner.inflight {
                debug!("joining in-flight connect attempt");
                inflight.clone()
            } else {
                let attempt = Self::connect_attempt(
                    self.transport.clone(),
                    self.config.clone(),
                    token.to_string(),
                    self.inner.clone(),
                    inner.epoch,
                );
                inner.inflight = Some(attempt.clone());
                attempt
            }
        };
        attempt.await
    }

    /// Close and discard the current connection, and invalidate any
    /// in-flight attempt. Idempotent.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.inflight = None;
        if let Some(handle) = inner.current.take() {
            debug!(connection = %handle.id(), "releasing connection");
            handle.close();
        }
    }

    /// Non-blocking snapshot of the current connection.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ConnectionHandle>> {
        self.inner.lock().current.clone()
    }

    /// Build the shared connect future. The future itself commits the
    /// outcome back into the slot, so joiners never race on bookkeeping.
    fn connect_attempt(
        transport: Arc<dyn Transport>,
        config: RealtimeConfig,
        token: String,
        inner: Arc<Mutex<RegistryInner>>,
        epoch: u64,
    ) -> ConnectFuture {
        async move {
            let result = ConnectionHandle::establish(transport, config, token).await;
            let mut guard = inner.lock();
            // A stale attempt (released while in flight) owns no
            // bookkeeping: the inflight slot may already belong to a
            // newer attempt and must be left alone.
            match result {
                Ok(handle) => {
                    if guard.epoch == epoch {
                        guard.inflight = None;
                        guard.current = Some(handle.clone());
                    } else {
                        handle.close();
                    }
                    Ok(handle)
                }
                Err(e) => {
                    if guard.epoch == epoch {
                        guard.inflight = None;
                    }
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use assert_matches::assert_matches;

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            endpoint: "ws://test/realtime".to_string(),
            handshake_timeout: Duration::from_secs(5),
            reconnect: BackoffConfig::default(),
        }
    }

    fn registry_over(transport: Arc<MockTransport>) -> ConnectionRegistry {
        ConnectionRegistry::new(transport, config())
    }

    #[tokio::test]
    async fn empty_token_is_auth_required() {
        let registry = registry_over(Arc::new(MockTransport::new()));
        let result = registry.acquire("").await;
        assert_matches!(result.unwrap_err(), ConnectError::AuthRequired);
        // Caller error: no handshake was attempted.
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn acquire_establishes_and_stores() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_over(transport.clone());

        let handle = registry.acquire("T1").await.unwrap();
        assert!(handle.is_open());
        assert!(Arc::ptr_eq(&registry.current().unwrap(), &handle));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn acquire_is_idempotent_while_open() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_over(transport.clone());

        let first = registry.acquire("T1").await.unwrap();
        let second = registry.acquire("T1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_acquires_coalesce_into_one_handshake() {
        let transport = Arc::new(MockTransport::gated());
        let registry = Arc::new(registry_over(transport.clone()));

        let r1 = registry.clone();
        let r2 = registry.clone();
        let a = tokio::spawn(async move { r1.acquire("T1").await });
        let b = tokio::spawn(async move { r2.acquire("T1").await });
        tokio::task::yield_now().await;

        // One permit is enough for both callers.
        transport.release_one();
        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn handshake_failure_reaches_every_joiner() {
        let transport = Arc::new(MockTransport::gated());
        transport.script_failure("401");
        let registry = Arc::new(registry_over(transport.clone()));

        let r1 = registry.clone();
        let r2 = registry.clone();
        let a = tokio::spawn(async move { r1.acquire("T1").await });
        let b = tokio::spawn(async move { r2.acquire("T1").await });
        tokio::task::yield_now().await;
        transport.release_one();

        assert_matches!(
            a.await.unwrap().unwrap_err(),
            ConnectError::HandshakeFailed { .. }
        );
        assert_matches!(
            b.await.unwrap().unwrap_err(),
            ConnectError::HandshakeFailed { .. }
        );
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn failed_attempt_clears_inflight_for_retry() {
        let transport = Arc::new(MockTransport::new());
        transport.script_failure("401");
        let registry = registry_over(transport.clone());

        assert!(registry.acquire("T1").await.is_err());
        // A later acquire starts fresh rather than joining a dead attempt.
        let handle = registry.acquire("T1").await.unwrap();
        assert!(handle.is_open());
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn release_closes_and_clears() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_over(transport.clone());

        let handle = registry.acquire("T1").await.unwrap();
        let mut phase = handle.watch_phase();
        registry.release();

        assert!(registry.current().is_none());
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();
        assert!(transport.link(0).is_closed());
    }

    #[tokio::test]
    async fn release_with_no_handle_is_noop() {
        let registry = registry_over(Arc::new(MockTransport::new()));
        registry.release();
        registry.release();
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn release_during_inflight_prevents_adoption() {
        let transport = Arc::new(MockTransport::gated());
        let registry = Arc::new(registry_over(transport.clone()));

        let r1 = registry.clone();
        let pending = tokio::spawn(async move { r1.acquire("T1").await });
        tokio::task::yield_now().await;

        // Release while the handshake is suspended, then let it finish.
        registry.release();
        transport.release_one();

        let handle = pending.await.unwrap().unwrap();
        let mut phase = handle.watch_phase();
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn stale_attempt_leaves_newer_inflight_intact() {
        let transport = Arc::new(MockTransport::gated());
        let registry = Arc::new(registry_over(transport.clone()));

        // First attempt suspends mid-handshake, then gets invalidated.
        let r1 = registry.clone();
        let first = tokio::spawn(async move { r1.acquire("T1").await });
        tokio::task::yield_now().await;
        registry.release();

        // A second attempt starts under the new epoch.
        let r2 = registry.clone();
        let second = tokio::spawn(async move { r2.acquire("T2").await });
        tokio::task::yield_now().await;

        // The stale T1 handshake finishes while T2 is still connecting;
        // its handle is closed and T2's in-flight entry survives.
        transport.release_one();
        let stale = first.await.unwrap().unwrap();
        let mut phase = stale.watch_phase();
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();

        // A third caller joins the live attempt instead of starting a
        // duplicate handshake.
        let r3 = registry.clone();
        let third = tokio::spawn(async move { r3.acquire("T2").await });
        tokio::task::yield_now().await;
        transport.release_one();

        let b = second.await.unwrap().unwrap();
        let c = third.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(transport.tokens(), vec!["T1".to_string(), "T2".to_string()]);
        assert_eq!(registry.current().unwrap().token(), "T2");
    }

    #[tokio::test]
    async fn closed_handle_does_not_hold_the_slot() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_over(transport.clone());

        let first = registry.acquire("T1").await.unwrap();
        let mut phase = first.watch_phase();
        first.close();
        let _ = phase
            .wait_for(|p| *p == TransportPhase::Closed)
            .await
            .unwrap();

        let second = registry.acquire("T1").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_open());
        assert_eq!(transport.connect_count(), 2);
    }

    #[test]
    fn config_from_settings() {
        let settings = RealtimeSettings::default();
        let config = RealtimeConfig::from_settings(&settings);
        assert_eq!(config.endpoint, settings.endpoint);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect.max_attempts, 5);
    }
}
