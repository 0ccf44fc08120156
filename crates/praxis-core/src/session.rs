//! Authentication session model and the watch-backed session source.
//!
//! The connection lifecycle never acquires tokens itself — an external
//! identity service does. This module is the read/subscribe surface the
//! rest of the process consumes: [`SessionStore::current`] is the
//! synchronous read, [`SessionStore::subscribe`] delivers transitions
//! (login, token refresh, logout).

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Current epoch time in milliseconds.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The caller's current proof of authentication.
///
/// Replaced wholesale on refresh, destroyed on logout. The realtime core
/// only ever reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer token presented at the streaming handshake.
    pub access_token: String,
    /// Expiry as epoch milliseconds, or `None` for non-expiring tokens.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Session {
    /// Create a session with no expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// Whether the token is past its expiry at `now` (epoch ms).
    ///
    /// Sessions without an expiry never expire.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Source of truth for the current authentication session.
///
/// Backed by a `tokio::sync::watch` channel: writes are whole-value
/// replacements, readers always observe a complete `Option<Session>`.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Create an empty store (no session).
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Synchronous read of the current session.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Subscribe to session transitions.
    ///
    /// The receiver yields on every [`set`](Self::set), including
    /// replacements with an identical value — the lifecycle controller
    /// decides whether a transition is a no-op.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    /// Replace the current session (login, refresh, or logout with `None`).
    pub fn set(&self, session: Option<Session>) {
        let _ = self.tx.send_replace(session);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
