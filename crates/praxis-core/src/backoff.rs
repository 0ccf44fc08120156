//! Reconnection backoff configuration and delay math.
//!
//! The async retry loop lives in `praxis-realtime` (which has access to
//! tokio); this module holds the portable, sync-only building blocks:
//!
//! - [`BackoffConfig`]: bounded retry parameters
//! - [`backoff_delay`]: capped exponential delay
//! - [`backoff_delay_with_random`]: the same with symmetric jitter

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum reconnect attempts per connection instance.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default initial delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Bounded-retry parameters for the reconnection policy.
///
/// Exhausting `max_attempts` is a terminal event for the connection
/// instance it governs, observable as the `Closed` phase.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Maximum reconnect attempts (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt in ms (default: 1000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Cap on the delay between attempts in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delay calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Capped exponential delay without jitter.
///
/// Formula: `min(max_delay, initial_delay * 2^attempt)` where `attempt`
/// is zero-based. Overflow-safe for arbitrarily high attempt numbers.
#[must_use]
pub fn backoff_delay(attempt: u32, config: &BackoffConfig) -> u64 {
    let exponential = config
        .initial_delay_ms
        .saturating_mul(1u64 << attempt.min(31));
    exponential.min(config.max_delay_ms)
}

/// Capped exponential delay with symmetric jitter.
///
/// `random` must come from a PRNG in `[0.0, 1.0)`; it maps to a
/// multiplier in `[1 - jitter, 1 + jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_with_random(attempt: u32, config: &BackoffConfig, random: f64) -> u64 {
    let capped = backoff_delay(attempt, config);
    let jitter = 1.0 + (random * 2.0 - 1.0) * config.jitter_factor;
    ((capped as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
