//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files deserialize with the remaining fields at their defaults.

mod engine;
mod runtime;

pub use engine::*;
pub use runtime::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "reputation": { "solved": 40 },
///   "readTracking": { "oldPostDays": 7 },
///   "store": { "dbPath": "/var/lib/engage/engage.db" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngageSettings {
    /// Reputation weights per vote kind.
    pub reputation: ReputationWeights,
    /// Vote change rules.
    pub rating: RatingSettings,
    /// Read tracking switches and staleness window.
    pub read_tracking: ReadTrackingSettings,
    /// Mail dispatch window.
    pub mail: MailSettings,
    /// Record store location and pool tuning.
    pub store: StoreSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl EngageSettings {
    /// Reject combinations the engines cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be at least 1".into(),
            ));
        }
        if self.rating.max_editing_time_secs < 0 {
            return Err(SettingsError::InvalidValue(
                "rating.maxEditingTimeSecs must not be negative".into(),
            ));
        }
        if self.read_tracking.clean_read_hour > 23 {
            return Err(SettingsError::InvalidValue(format!(
                "readTracking.cleanReadHour must be 0-23, got {}",
                self.read_tracking.clean_read_hour
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
