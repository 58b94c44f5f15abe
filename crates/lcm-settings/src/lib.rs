//! # lcm-settings
//!
//! Configuration for the context ledger tools.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LedgerSettings::default()`]
//! 2. **User file**: `~/.openclaw/lcm-ledger.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LCM_*` overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    openclaw_dir, settings_path,
};
pub use types::{DatabaseSettings, LedgerSettings, LoggingSettings};
