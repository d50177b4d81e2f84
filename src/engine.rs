//! Risk engine facade
//!
//! Wires the estimators to one store, one config, one clock, and the single
//! prediction cache slot. Every top-level call reads the clock once and
//! re-reads the onboarding profile, so a re-onboarding is visible on the next
//! call without any explicit reset.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::RiskError;
use crate::gate::InterventionGate;
use crate::harbor::find_safe_harbor;
use crate::live::LiveRiskAggregator;
use crate::peak::find_peak_window;
use crate::predictor::{extract_features, CacheSlot, LogisticPredictor};
use crate::profile::BaselineProfileBuilder;
use crate::recommend::{AccuracyEstimator, Recommender};
use crate::store::EventStore;
use crate::types::{
    HourlyRiskProfile, OnboardingProfile, PeakWindow, PredictionFeatures, PredictionResult,
    Recommendation, RiskLevel, SafeHarbor, Trigger, DEFAULT_URGE_DURATION_MINUTES,
};

/// Everything the UI shows, computed against a single `now`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub generated_at: DateTime<FixedOffset>,
    pub onboarded: bool,
    pub hourly_profile: HourlyRiskProfile,
    pub peak_window: PeakWindow,
    pub profile_hour_risk: u8,
    pub frequency_risk: u8,
    pub live_risk: u8,
    pub live_risk_level: RiskLevel,
    pub spike_risk: u8,
    pub current_assessment: u8,
    pub safe_harbor: Option<SafeHarbor>,
    pub frequency_safe_harbor: Option<SafeHarbor>,
    pub features: PredictionFeatures,
    pub prediction: PredictionResult,
    pub should_auto_trigger: bool,
    pub recommendation: Recommendation,
    pub accuracy: u8,
}

/// Profile read once per call
struct Baseline {
    profile: Option<OnboardingProfile>,
    curve: HourlyRiskProfile,
    /// False when the store could not be read
    readable: bool,
}

impl Baseline {
    fn triggers(&self) -> Vec<Trigger> {
        self.profile
            .as_ref()
            .map(|p| p.triggers.iter().copied().collect())
            .unwrap_or_default()
    }

    fn urge_duration_minutes(&self) -> u32 {
        self.profile
            .as_ref()
            .map(|p| p.urge_duration_minutes)
            .unwrap_or(DEFAULT_URGE_DURATION_MINUTES)
    }
}

pub struct RiskEngine<S: EventStore> {
    store: S,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    predictor: LogisticPredictor,
    cache: Mutex<CacheSlot<Arc<PredictionResult>>>,
}

impl<S: EventStore> RiskEngine<S> {
    /// Engine on the device clock
    pub fn new(store: S, config: EngineConfig) -> Result<Self, RiskError> {
        Self::with_clock(store, config, Box::new(SystemClock))
    }

    pub fn with_clock(
        store: S,
        config: EngineConfig,
        clock: Box<dyn Clock>,
    ) -> Result<Self, RiskError> {
        config.validate()?;
        let ttl = Duration::try_seconds(config.prediction_cache_ttl_secs).ok_or_else(|| {
            RiskError::InvalidConfig(format!(
                "prediction_cache_ttl_secs out of range: {}",
                config.prediction_cache_ttl_secs
            ))
        })?;
        Ok(Self {
            store,
            config,
            clock,
            predictor: LogisticPredictor::default(),
            cache: Mutex::new(CacheSlot::new(ttl)),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time at the store's UTC offset, so hour-of-day lookups use
    /// the same buckets the store counts events in
    pub fn now(&self) -> DateTime<FixedOffset> {
        let now = self.clock.now();
        match FixedOffset::east_opt(self.store.utc_offset_minutes().saturating_mul(60)) {
            Some(offset) => now.with_timezone(&offset),
            None => now,
        }
    }

    fn baseline(&self) -> Baseline {
        match self.store.latest_profile() {
            Ok(profile) => Baseline {
                curve: BaselineProfileBuilder::build(profile.as_ref()),
                profile,
                readable: true,
            },
            Err(err) => {
                log::warn!("onboarding profile unavailable, using flat default: {err}");
                Baseline {
                    profile: None,
                    curve: BaselineProfileBuilder::build(None),
                    readable: false,
                }
            }
        }
    }

    fn aggregator(&self) -> LiveRiskAggregator<'_, S> {
        LiveRiskAggregator::new(&self.store, &self.config)
    }

    fn cache(&self) -> MutexGuard<'_, CacheSlot<Arc<PredictionResult>>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 24-hour baseline curve from the latest profile
    pub fn hourly_profile(&self) -> HourlyRiskProfile {
        self.baseline().curve
    }

    pub fn peak_window(&self) -> PeakWindow {
        let baseline = self.baseline();
        find_peak_window(&baseline.curve, &baseline.triggers())
    }

    pub fn profile_hour_risk(&self) -> u8 {
        self.aggregator()
            .profile_hour_risk(&self.baseline().curve, self.now())
    }

    pub fn frequency_risk(&self) -> u8 {
        self.aggregator().frequency_risk(self.now())
    }

    pub fn live_risk(&self) -> u8 {
        self.aggregator().live_risk(&self.baseline().curve, self.now())
    }

    /// `baseline` plus the duration-aware urge/lapse spike
    pub fn spike_risk(&self, baseline: u8) -> u8 {
        let duration = self.baseline().urge_duration_minutes();
        self.aggregator().spike_risk(baseline, duration, self.now())
    }

    /// Live risk with the recent-urge bump applied
    pub fn current_assessment(&self) -> u8 {
        let now = self.now();
        let aggregator = self.aggregator();
        let live = aggregator.live_risk(&self.baseline().curve, now);
        aggregator.current_assessment(live, now)
    }

    /// First profile hour under the safe threshold within 24 hours
    pub fn safe_harbor(&self) -> Option<SafeHarbor> {
        self.safe_harbor_at(&self.baseline(), self.now())
    }

    /// First hour whose screen-on frequency is under the safe threshold
    /// within 12 hours
    pub fn frequency_safe_harbor(&self) -> Option<SafeHarbor> {
        self.frequency_safe_harbor_at(self.now())
    }

    pub fn prediction_features(&self) -> PredictionFeatures {
        extract_features(&self.store, &self.config, self.now())
    }

    pub fn predict(&self) -> Arc<PredictionResult> {
        let now = self.now();
        let features = extract_features(&self.store, &self.config, now);
        self.predict_with(&features, now)
    }

    /// Drop the cached prediction so the next call recomputes
    pub fn invalidate_prediction(&self) {
        self.cache().invalidate();
    }

    /// Call right after an urge is logged: clears the cached prediction
    /// before reassessing
    pub fn assess_after_urge_log(&self) -> u8 {
        self.invalidate_prediction();
        self.current_assessment()
    }

    pub fn should_auto_trigger(&self, current_risk: u8) -> bool {
        InterventionGate::new(&self.store, &self.config)
            .should_auto_trigger(current_risk, self.now())
    }

    pub fn recommend(&self) -> Recommendation {
        Recommender::new(&self.store).recommend()
    }

    /// Retrospective accuracy percentage
    pub fn accuracy(&self) -> u8 {
        AccuracyEstimator::new(&self.store, &self.config).accuracy(self.now())
    }

    /// Every estimate at one instant
    pub fn report(&self) -> RiskReport {
        let now = self.now();
        let baseline = self.baseline();
        let aggregator = self.aggregator();

        let profile_hour_risk = aggregator.profile_hour_risk(&baseline.curve, now);
        let frequency_risk = aggregator.frequency_risk(now);
        let live_risk = aggregator.live_risk(&baseline.curve, now);
        let current_assessment = aggregator.current_assessment(live_risk, now);
        let spike_risk =
            aggregator.spike_risk(live_risk, baseline.urge_duration_minutes(), now);
        let features = extract_features(&self.store, &self.config, now);
        let prediction = self.predict_with(&features, now);

        RiskReport {
            generated_at: now,
            onboarded: baseline.profile.is_some(),
            peak_window: find_peak_window(&baseline.curve, &baseline.triggers()),
            profile_hour_risk,
            frequency_risk,
            live_risk,
            live_risk_level: RiskLevel::from_score(live_risk),
            spike_risk,
            current_assessment,
            safe_harbor: self.safe_harbor_at(&baseline, now),
            frequency_safe_harbor: self.frequency_safe_harbor_at(now),
            features,
            prediction: (*prediction).clone(),
            should_auto_trigger: InterventionGate::new(&self.store, &self.config)
                .should_auto_trigger(current_assessment, now),
            recommendation: Recommender::new(&self.store).recommend(),
            accuracy: AccuracyEstimator::new(&self.store, &self.config).accuracy(now),
            hourly_profile: baseline.curve,
        }
    }

    fn predict_with(
        &self,
        features: &PredictionFeatures,
        now: DateTime<FixedOffset>,
    ) -> Arc<PredictionResult> {
        let mut cache = self.cache();
        self.predictor.predict(features, &mut cache, now)
    }

    fn safe_harbor_at(
        &self,
        baseline: &Baseline,
        now: DateTime<FixedOffset>,
    ) -> Option<SafeHarbor> {
        // An unreadable store forecasts nothing rather than the flat default
        if !baseline.readable {
            return None;
        }
        find_safe_harbor(
            |hour| Some(baseline.curve.risk_at(hour as u32)),
            now,
            self.config.profile_harbor_horizon_hours,
            self.config.safe_threshold,
        )
    }

    fn frequency_safe_harbor_at(&self, now: DateTime<FixedOffset>) -> Option<SafeHarbor> {
        let aggregator = self.aggregator();
        find_safe_harbor(
            |hour| aggregator.try_frequency_risk_at(hour, now).ok(),
            now,
            self.config.frequency_harbor_horizon_hours,
            self.config.safe_threshold,
        )
    }
}
