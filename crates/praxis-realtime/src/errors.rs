//! Connection error types.
//!
//! Errors here cover connection *acquisition* only. An interruption of an
//! established connection is not an error value — it is a transport event
//! that drives the `Open → Reconnecting` transition, observable solely
//! through the connection phase and the derived `connected` flag.

/// Errors that can occur while acquiring a streaming connection.
///
/// `Clone` because coalesced callers joining one in-flight attempt all
/// receive the same outcome.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Acquisition was attempted without a session token. Caller bug,
    /// never retried automatically.
    #[error("connection acquisition requires a session token")]
    AuthRequired,

    /// The transport rejected the authenticated handshake.
    #[error("handshake rejected: {reason}")]
    HandshakeFailed {
        /// Transport-reported rejection reason.
        reason: String,
    },

    /// The handshake neither succeeded nor failed within the bounded
    /// window. Treated exactly like a rejection by the retry path.
    #[error("handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// The window that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
