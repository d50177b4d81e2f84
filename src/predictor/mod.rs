//! Logistic urge predictor
//!
//! Turns a feature vector into a probability, a confidence band, and a
//! ranked list of explanation factors. Results are memoized in a single-slot
//! cache keyed by a hash of the features.

pub mod cache;
pub mod explain;
pub mod features;
pub mod model;

pub use cache::CacheSlot;
pub use explain::{explain, ExplanationRule, EXPLANATION_RULES, MAX_FACTORS};
pub use features::extract_features;
pub use model::{ModelWeights, DEFAULT_WEIGHTS};

use chrono::{DateTime, FixedOffset};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::{PredictionFeatures, PredictionResult, RiskLevel};

/// Cache key over everything the result depends on.
///
/// The raw hours since the last urge only matter through the confidence
/// bands, so only its stale bucket is hashed.
pub fn feature_key(features: &PredictionFeatures) -> u64 {
    let mut hasher = DefaultHasher::new();
    features.hour.hash(&mut hasher);
    features.day_of_week.hash(&mut hasher);
    features.screen_unlocks_last_hour.hash(&mut hasher);
    features.evening_routine_done.hash(&mut hasher);
    features.is_late_night.hash(&mut hasher);
    features.is_recent_urge.hash(&mut hasher);
    (features.hours_since_last_urge > model::STALE_URGE_HOURS).hash(&mut hasher);
    features.stress_level.hash(&mut hasher);
    features.loneliness_level.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Default)]
pub struct LogisticPredictor {
    weights: ModelWeights,
}

impl LogisticPredictor {
    pub fn new(weights: ModelWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    /// Uncached prediction
    pub fn evaluate(&self, features: &PredictionFeatures) -> PredictionResult {
        let probability = self.weights.probability(features);
        PredictionResult {
            probability,
            confidence: model::confidence(features),
            risk_level: RiskLevel::from_probability(probability),
            factors: explain(features),
        }
    }

    /// Prediction through `cache`. A hit returns the stored `Arc` itself.
    pub fn predict(
        &self,
        features: &PredictionFeatures,
        cache: &mut CacheSlot<Arc<PredictionResult>>,
        now: DateTime<FixedOffset>,
    ) -> Arc<PredictionResult> {
        let key = feature_key(features);
        if let Some(hit) = cache.get(key, now) {
            log::debug!("prediction cache hit ({key:016x})");
            return hit;
        }

        let result = Arc::new(self.evaluate(features));
        cache.put(key, Arc::clone(&result), now);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, FactorKind};
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, 12, minute, 0)
            .unwrap()
    }

    fn features() -> PredictionFeatures {
        PredictionFeatures {
            hour: 12,
            day_of_week: 1,
            screen_unlocks_last_hour: 3,
            evening_routine_done: false,
            is_late_night: false,
            is_recent_urge: false,
            hours_since_last_urge: 5.0,
            stress_level: 4,
            loneliness_level: 2,
        }
    }

    #[test]
    fn test_evaluate_shape() {
        let result = LogisticPredictor::default().evaluate(&features());

        assert!(result.probability > 0.0 && result.probability < 1.0);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.risk_level, RiskLevel::from_probability(result.probability));
        assert!(!result.factors.is_empty());
        assert!(result.factors.len() <= MAX_FACTORS);
    }

    #[test]
    fn test_cache_returns_same_arc() {
        let predictor = LogisticPredictor::default();
        let mut cache = CacheSlot::new(Duration::seconds(300));

        let first = predictor.predict(&features(), &mut cache, at(0));
        let second = predictor.predict(&features(), &mut cache, at(4));
        assert!(Arc::ptr_eq(&first, &second));

        let changed = PredictionFeatures {
            screen_unlocks_last_hour: 4,
            ..features()
        };
        let third = predictor.predict(&changed, &mut cache, at(4));
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_cache_expires_and_invalidates() {
        let predictor = LogisticPredictor::default();
        let mut cache = CacheSlot::new(Duration::seconds(300));

        let first = predictor.predict(&features(), &mut cache, at(0));
        let expired = predictor.predict(&features(), &mut cache, at(6));
        assert!(!Arc::ptr_eq(&first, &expired));

        cache.invalidate();
        let fresh = predictor.predict(&features(), &mut cache, at(7));
        assert!(!Arc::ptr_eq(&expired, &fresh));
        assert_eq!(*expired, *fresh);
    }

    #[test]
    fn test_key_tracks_urge_staleness_only() {
        let a = features();
        let b = PredictionFeatures {
            hours_since_last_urge: 7.5,
            ..a
        };
        let c = PredictionFeatures {
            hours_since_last_urge: 13.0,
            ..a
        };
        assert_eq!(feature_key(&a), feature_key(&b));
        assert_ne!(feature_key(&a), feature_key(&c));
    }

    #[test]
    fn test_protective_factor_always_present() {
        let hot = PredictionFeatures {
            hour: 1,
            is_late_night: true,
            screen_unlocks_last_hour: 15,
            stress_level: 8,
            ..features()
        };
        let result = LogisticPredictor::default().evaluate(&hot);
        assert!(result
            .factors
            .iter()
            .any(|f| f.kind == FactorKind::Protective));
    }
}
