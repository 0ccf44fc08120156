//! # praxis-core
//!
//! Foundation types shared across the Praxis realtime core:
//!
//! - [`Session`] and [`SessionStore`]: the authentication session and the
//!   watch-backed source-of-truth consumed by the connection lifecycle
//! - [`BackoffConfig`]: bounded exponential backoff parameters and math
//!   for the reconnection policy
//! - [`NotificationRecord`]: the notification wire/display model

#![deny(unsafe_code)]

pub mod backoff;
pub mod notification;
pub mod session;

pub use backoff::{BackoffConfig, backoff_delay, backoff_delay_with_random};
pub use notification::{NotificationRecord, count_unread, sort_newest_first};
pub use session::{Session, SessionStore, now_ms};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _store = SessionStore::new();
        let _config = BackoffConfig::default();
        let _ = now_ms();
    }
}
