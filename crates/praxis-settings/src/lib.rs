//! # praxis-settings
//!
//! Configuration management with layered sources for the Praxis
//! realtime core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`PraxisSettings::default()`]
//! 2. **User file** — `~/.praxis/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `PRAXIS_*` overrides (highest priority)
//!
//! The realtime endpoint has a documented fallback: when neither
//! `PRAXIS_REALTIME_URL` nor the settings file names one, a warning is
//! logged and the compiled default is used.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    REALTIME_URL_VAR, apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
