//! Settings type definitions with compiled defaults.

use praxis_core::BackoffConfig;
use serde::{Deserialize, Serialize};

/// Default realtime endpoint used when `PRAXIS_REALTIME_URL` and the
/// settings file are both silent.
pub const DEFAULT_REALTIME_ENDPOINT: &str = "ws://127.0.0.1:4000/realtime";
/// Default REST base URL for the notification API.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:4000";

/// Top-level settings for the Praxis realtime core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PraxisSettings {
    /// Settings schema version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Streaming connection settings.
    #[serde(default)]
    pub realtime: RealtimeSettings,
    /// Notification poller settings.
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl Default for PraxisSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            realtime: RealtimeSettings::default(),
            notifications: NotificationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Streaming connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSettings {
    /// WebSocket endpoint of the realtime service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bound on a pending handshake; attempts exceeding it count as
    /// failures and feed the retry path.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Reconnection policy after an established connection drops.
    #[serde(default)]
    pub reconnect: BackoffConfig,
}

fn default_endpoint() -> String {
    DEFAULT_REALTIME_ENDPOINT.to_string()
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            reconnect: BackoffConfig::default(),
        }
    }
}

/// Notification poller settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// REST base URL for the notification API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Full-list refresh interval in ms.
    #[serde(default = "default_list_interval_ms")]
    pub list_interval_ms: u64,
    /// Unread-count refresh interval in ms (intentionally shorter than
    /// the list interval; the two loops are decoupled).
    #[serde(default = "default_count_interval_ms")]
    pub count_interval_ms: u64,
    /// Per-request timeout in ms.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}
fn default_list_interval_ms() -> u64 {
    30_000
}
fn default_count_interval_ms() -> u64 {
    15_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            list_interval_ms: default_list_interval_ms(),
            count_interval_ms: default_count_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Default log level; `RUST_LOG` takes priority at runtime.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
