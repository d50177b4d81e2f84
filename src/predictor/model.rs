//! Fixed-weight logistic model

use super::features::RECENT_URGE_HOURS;
use crate::types::{Confidence, PredictionFeatures};

/// Coefficients of the logistic model. Fixed, never trained at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelWeights {
    pub intercept: f64,
    pub hour: f64,
    pub day_of_week: f64,
    pub screen_unlocks_last_hour: f64,
    pub evening_routine_done: f64,
    pub is_late_night: f64,
    pub is_recent_urge: f64,
    pub stress_level: f64,
    pub loneliness_level: f64,
}

/// Recent urges lower short-term probability (refractory period); the
/// evening routine is protective.
pub const DEFAULT_WEIGHTS: ModelWeights = ModelWeights {
    intercept: -2.2,
    hour: 0.03,
    day_of_week: 0.04,
    screen_unlocks_last_hour: 0.09,
    evening_routine_done: -0.6,
    is_late_night: 1.1,
    is_recent_urge: -1.4,
    stress_level: 0.18,
    loneliness_level: 0.15,
};

impl Default for ModelWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl ModelWeights {
    /// Linear score z = intercept + sum(w_i * x_i)
    pub fn score(&self, features: &PredictionFeatures) -> f64 {
        self.intercept
            + self.hour * features.hour as f64
            + self.day_of_week * features.day_of_week as f64
            + self.screen_unlocks_last_hour * features.screen_unlocks_last_hour as f64
            + self.evening_routine_done * flag(features.evening_routine_done)
            + self.is_late_night * flag(features.is_late_night)
            + self.is_recent_urge * flag(features.is_recent_urge)
            + self.stress_level * features.stress_level as f64
            + self.loneliness_level * features.loneliness_level as f64
    }

    /// Probability in the open interval (0, 1)
    pub fn probability(&self, features: &PredictionFeatures) -> f64 {
        sigmoid(self.score(features))
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

const PROBABILITY_EPSILON: f64 = 1e-6;

/// Logistic function, clamped so extreme scores never reach 0 or 1
pub fn sigmoid(z: f64) -> f64 {
    (1.0 / (1.0 + (-z).exp())).clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON)
}

/// Urge gaps beyond this many hours leave the model with little signal
pub const STALE_URGE_HOURS: f64 = 12.0;

/// Unlock counts above this mark a clearly active session
pub const ACTIVE_UNLOCKS: u32 = 10;

/// HIGH when there is a fresh signal, LOW when the last urge is stale
pub fn confidence(features: &PredictionFeatures) -> Confidence {
    if features.hours_since_last_urge < RECENT_URGE_HOURS
        || features.screen_unlocks_last_hour > ACTIVE_UNLOCKS
    {
        Confidence::High
    } else if features.hours_since_last_urge > STALE_URGE_HOURS {
        Confidence::Low
    } else {
        Confidence::Medium
    }
}
