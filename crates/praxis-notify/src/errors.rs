//! Notification API error types.

use thiserror::Error;

/// Errors from the notification REST API.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("notification API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        message: String,
    },

    /// The response body did not parse.
    #[error("invalid notification payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Convenience alias for notification results.
pub type Result<T> = std::result::Result<T, NotifyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status() {
        let err = NotifyError::Api {
            status: 503,
            message: "maintenance".into(),
        };
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("maintenance"));
    }
}
