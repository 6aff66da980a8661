use std::time::Duration;

use progress_core::CheatPolicy;
use progress_core::anti_cheat::{DEFAULT_GRACE_SECONDS, DEFAULT_SPEED_TOLERANCE};
use progress_core::model::DEFAULT_NEAR_UNLOCK_PERCENT;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "progress:";

/// Tunables of the progress engine. Every field has a default, so a config
/// file only names what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Minimum gap between durable writes of one (student, chapter) key.
    pub sync_interval_secs: u64,
    /// Sliding TTL of cached snapshots and their sync markers.
    pub cache_ttl_secs: u64,
    pub cheat_speed_tolerance: f64,
    pub cheat_grace_secs: i64,
    pub near_unlock_percent: u8,
    pub cache_key_prefix: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cheat_speed_tolerance: DEFAULT_SPEED_TOLERANCE,
            cheat_grace_secs: DEFAULT_GRACE_SECONDS,
            near_unlock_percent: DEFAULT_NEAR_UNLOCK_PERCENT,
            cache_key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_owned(),
        }
    }
}

impl EngineSettings {
    /// # Errors
    ///
    /// Rejects a negative or non-finite speed tolerance and a negative grace
    /// window.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let tolerance = self.cheat_speed_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(SettingsError::SpeedTolerance(tolerance));
        }
        if self.cheat_grace_secs < 0 {
            return Err(SettingsError::GraceSeconds(self.cheat_grace_secs));
        }
        Ok(())
    }

    #[must_use]
    pub fn cheat_policy(&self) -> CheatPolicy {
        CheatPolicy::new(self.cheat_speed_tolerance, self.cheat_grace_secs)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Sync interval in milliseconds, saturating.
    #[must_use]
    pub fn sync_interval_millis(&self) -> i64 {
        i64::try_from(self.sync_interval_secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let settings: EngineSettings = serde_json::from_str(r#"{"sync_interval_secs": 10}"#).unwrap();
        assert_eq!(settings.sync_interval_secs, 10);
        assert_eq!(settings.cache_ttl_secs, 604_800);
        assert_eq!(settings.cheat_policy(), CheatPolicy::default());
        assert_eq!(settings.cache_key_prefix, "progress:");
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EngineSettings::default().validate(), Ok(()));
    }

    #[test]
    fn broken_cheat_window_is_rejected() {
        for tolerance in [-0.5, f64::NAN, f64::INFINITY] {
            let settings = EngineSettings {
                cheat_speed_tolerance: tolerance,
                ..EngineSettings::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(SettingsError::SpeedTolerance(_))
            ));
        }

        let settings = EngineSettings {
            cheat_grace_secs: -1,
            ..EngineSettings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::GraceSeconds(-1)));
    }

    #[test]
    fn sync_interval_saturates() {
        let settings = EngineSettings {
            sync_interval_secs: u64::MAX,
            ..EngineSettings::default()
        };
        assert_eq!(settings.sync_interval_millis(), i64::MAX);
    }
}
