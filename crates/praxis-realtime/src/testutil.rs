//! Scripted in-memory transport for tests.
//!
//! [`MockTransport`] records every handshake (token, order), can be
//! scripted to fail or stall upcoming attempts, and exposes a
//! [`LinkProbe`] per established link so tests can push messages or
//! inject interruptions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::errors::ConnectError;
use crate::transport::{LinkEvent, Transport, TransportLink};

/// Test-side view of one established link.
#[derive(Clone, Debug)]
pub struct LinkProbe {
    tx: mpsc::Sender<LinkEvent>,
    closer: CancellationToken,
}

impl LinkProbe {
    /// Push a server message through the link.
    pub async fn push(&self, value: serde_json::Value) {
        self.tx
            .send(LinkEvent::Message(value))
            .await
            .expect("link consumer gone");
    }

    /// Drop the connection as if the network failed.
    pub async fn interrupt(&self, reason: &str) {
        self.tx
            .send(LinkEvent::Interrupted {
                reason: reason.to_string(),
            })
            .await
            .expect("link consumer gone");
    }

    /// Whether the consumer closed this link.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }
}

#[derive(Default)]
struct MockInner {
    script: VecDeque<ConnectError>,
    tokens: Vec<String>,
    links: Vec<LinkProbe>,
}

/// Scripted [`Transport`] implementation.
///
/// Every `connect` succeeds unless a failure was scripted. An optional
/// gate makes handshakes suspend until the test releases them, which is
/// how in-flight races (coalescing, teardown) are exercised.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<MockInner>,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    /// Transport where every handshake resolves immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose handshakes block until [`release_one`](Self::release_one).
    #[must_use]
    pub fn gated() -> Self {
        Self {
            inner: Mutex::new(MockInner::default()),
            gate: Some(Arc::new(Semaphore::new(0))),
        }
    }

    /// Let exactly one pending handshake proceed.
    pub fn release_one(&self) {
        self.gate
            .as_ref()
            .expect("transport is not gated")
            .add_permits(1);
    }

    /// Fail the next unscripted handshake with `HandshakeFailed`.
    pub fn script_failure(&self, reason: &str) {
        self.inner
            .lock()
            .script
            .push_back(ConnectError::HandshakeFailed {
                reason: reason.to_string(),
            });
    }

    /// Number of handshake attempts seen so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.lock().tokens.len()
    }

    /// Tokens presented at each handshake, in order.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.inner.lock().tokens.clone()
    }

    /// Probe for the `n`-th established link (0-based).
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n + 1` links were established.
    #[must_use]
    pub fn link(&self, n: usize) -> LinkProbe {
        self.inner.lock().links[n].clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _endpoint: &str,
        token: &str,
        _handshake_timeout: Duration,
    ) -> Result<TransportLink, ConnectError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let mut inner = self.inner.lock();
        inner.tokens.push(token.to_string());
        if let Some(err) = inner.script.pop_front() {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(16);
        let closer = CancellationToken::new();
        inner.links.push(LinkProbe {
            tx,
            closer: closer.clone(),
        });
        Ok(TransportLink::new(rx, closer))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
