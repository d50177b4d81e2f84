//! Tunable engine constants
//!
//! Every window, threshold and blend ratio the estimators use lives here so
//! shells can override them from a JSON document instead of patching code.

use serde::{Deserialize, Serialize};

use crate::error::RiskError;

/// Longest a cached prediction may be reused
pub const MAX_PREDICTION_CACHE_TTL_SECS: i64 = 24 * 60 * 60;

/// Configuration for the risk engine with tunable thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Weight of the frequency estimate in the live blend (profile gets the rest)
    pub frequency_weight: f64,
    /// Trailing days averaged by the frequency estimator
    pub frequency_lookback_days: u32,

    /// Auto-trigger requires live risk at or above this
    pub trigger_threshold: u8,
    /// At most one shown intervention per this many minutes
    pub anti_spam_window_minutes: u32,

    /// Window for the "urge just logged" bump
    pub recent_urge_window_minutes: u32,
    pub recent_urge_bonus: u8,
    pub recent_urge_cap: u8,

    /// Duration-aware spike: per urge/lapse event, and the total cap
    pub spike_per_event: u8,
    pub spike_cap: u8,

    /// Hours strictly below this risk count as safe harbor
    pub safe_threshold: u8,
    pub profile_harbor_horizon_hours: u32,
    pub frequency_harbor_horizon_hours: u32,

    pub prediction_cache_ttl_secs: i64,
    /// Older check-ins are ignored by the predictor
    pub check_in_max_age_hours: u32,

    /// Retrospective accuracy
    pub accuracy_threshold: u8,
    pub accuracy_window_minutes: u32,
    pub accuracy_min_samples: usize,
    pub accuracy_fallback: u8,
    pub accuracy_lookback_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frequency_weight: 0.6,
            frequency_lookback_days: 7,
            trigger_threshold: 70,
            anti_spam_window_minutes: 30,
            recent_urge_window_minutes: 5,
            recent_urge_bonus: 15,
            recent_urge_cap: 95,
            spike_per_event: 15,
            spike_cap: 30,
            safe_threshold: 40,
            profile_harbor_horizon_hours: 24,
            frequency_harbor_horizon_hours: 12,
            prediction_cache_ttl_secs: 300,
            check_in_max_age_hours: 24,
            accuracy_threshold: 60,
            accuracy_window_minutes: 120,
            accuracy_min_samples: 5,
            accuracy_fallback: 58,
            accuracy_lookback_days: 30,
        }
    }
}

impl EngineConfig {
    /// Load a (possibly partial) config document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, RiskError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, RiskError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the estimators cannot work with
    pub fn validate(&self) -> Result<(), RiskError> {
        if !(0.0..=1.0).contains(&self.frequency_weight) {
            return Err(RiskError::InvalidConfig(format!(
                "frequency_weight must be within [0, 1], got {}",
                self.frequency_weight
            )));
        }

        let windows = [
            ("frequency_lookback_days", self.frequency_lookback_days),
            ("anti_spam_window_minutes", self.anti_spam_window_minutes),
            ("recent_urge_window_minutes", self.recent_urge_window_minutes),
            ("accuracy_window_minutes", self.accuracy_window_minutes),
            ("accuracy_lookback_days", self.accuracy_lookback_days),
            ("check_in_max_age_hours", self.check_in_max_age_hours),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(RiskError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        for (name, horizon) in [
            ("profile_harbor_horizon_hours", self.profile_harbor_horizon_hours),
            ("frequency_harbor_horizon_hours", self.frequency_harbor_horizon_hours),
        ] {
            if horizon == 0 || horizon > 24 {
                return Err(RiskError::InvalidConfig(format!(
                    "{name} must be within 1..=24, got {horizon}"
                )));
            }
        }

        let thresholds = [
            ("trigger_threshold", self.trigger_threshold),
            ("recent_urge_cap", self.recent_urge_cap),
            ("spike_cap", self.spike_cap),
            ("safe_threshold", self.safe_threshold),
            ("accuracy_threshold", self.accuracy_threshold),
            ("accuracy_fallback", self.accuracy_fallback),
        ];
        for (name, value) in thresholds {
            if value > 100 {
                return Err(RiskError::InvalidConfig(format!(
                    "{name} must be at most 100, got {value}"
                )));
            }
        }

        if !(0..=MAX_PREDICTION_CACHE_TTL_SECS).contains(&self.prediction_cache_ttl_secs) {
            return Err(RiskError::InvalidConfig(format!(
                "prediction_cache_ttl_secs must be within 0..={}, got {}",
                MAX_PREDICTION_CACHE_TTL_SECS, self.prediction_cache_ttl_secs
            )));
        }

        Ok(())
    }

    /// Weight of the profile estimate in the live blend
    pub fn profile_weight(&self) -> f64 {
        1.0 - self.frequency_weight
    }
}
