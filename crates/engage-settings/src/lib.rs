//! # engage-settings
//!
//! Configuration for the engagement engine, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults** ([`EngageSettings::default()`])
//! 2. **Settings file** (`~/.engage/settings.json` or an explicit path,
//!    deep-merged over the defaults)
//! 3. **Environment variables** (`ENGAGE_*` overrides)
//!
//! ```no_run
//! let settings = engage_settings::load_settings().unwrap_or_default();
//! println!("old posts after {} days", settings.read_tracking.old_post_days);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, engage_home, load_settings, load_settings_from_path,
    resolve_db_path, settings_path,
};
pub use types::*;
