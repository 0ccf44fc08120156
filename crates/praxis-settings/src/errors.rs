//! Settings error types.

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// JSON parsing or (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
