//! Intervention recommendation and retrospective accuracy
//!
//! The recommender ranks intervention types by how much they reduced
//! self-rated urge intensity in past sessions. The accuracy estimator replays
//! recorded risk snapshots against the urges that actually followed them.

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::RiskError;
use crate::store::{or_fallback, EventStore, MS_PER_DAY, MS_PER_MINUTE};
use crate::types::{CompletedSession, EventType, Recommendation, SessionEffectiveness};

/// Recommended when there is no session history
pub const DEFAULT_INTERVENTION: &str = "breathing";

pub const COLD_START_JUSTIFICATION: &str =
    "Breathing exercises are the most common starting point and work for most people";

/// Group completed sessions by type with the mean intensity reduction
pub fn group_sessions(sessions: &[CompletedSession]) -> Vec<SessionEffectiveness> {
    let mut groups: BTreeMap<&str, (i64, u32)> = BTreeMap::new();
    for session in sessions {
        let entry = groups.entry(session.intervention_type.as_str()).or_insert((0, 0));
        entry.0 += session.intensity_before as i64 - session.intensity_after as i64;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|(intervention_type, (total, count))| SessionEffectiveness {
            intervention_type: intervention_type.to_string(),
            mean_reduction: total as f64 / count as f64,
            count,
        })
        .collect()
}

/// Sort by mean reduction, most effective first; ties by type name
pub fn rank(mut effectiveness: Vec<SessionEffectiveness>) -> Vec<SessionEffectiveness> {
    effectiveness.retain(|e| e.count > 0 && e.mean_reduction.is_finite());
    effectiveness.sort_by(|a, b| {
        b.mean_reduction
            .total_cmp(&a.mean_reduction)
            .then_with(|| a.intervention_type.cmp(&b.intervention_type))
    });
    effectiveness
}

/// Recommendation from per-type effectiveness (any order)
pub fn recommend_from(effectiveness: Vec<SessionEffectiveness>) -> Recommendation {
    let ranked = rank(effectiveness);
    match ranked.first() {
        Some(top) => Recommendation {
            intervention_type: top.intervention_type.clone(),
            justification: format!(
                "{} reduced your urge intensity by {:.1} points on average over {} {}",
                top.intervention_type,
                top.mean_reduction,
                top.count,
                if top.count == 1 { "session" } else { "sessions" },
            ),
            mean_reduction: Some(top.mean_reduction),
            sample_count: top.count,
            ranked,
        },
        None => cold_start(),
    }
}

fn cold_start() -> Recommendation {
    Recommendation {
        intervention_type: DEFAULT_INTERVENTION.to_string(),
        justification: COLD_START_JUSTIFICATION.to_string(),
        mean_reduction: None,
        sample_count: 0,
        ranked: Vec::new(),
    }
}

pub struct Recommender<'a, S: EventStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: EventStore + ?Sized> Recommender<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn recommend(&self) -> Recommendation {
        recommend_from(or_fallback(
            self.store.session_effectiveness(),
            Vec::new(),
            "session effectiveness",
        ))
    }
}

/// Confusion counts from the snapshot replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccuracyTally {
    pub true_positive: u32,
    pub true_negative: u32,
    pub false_positive: u32,
    pub false_negative: u32,
}

impl AccuracyTally {
    pub fn record(&mut self, predicted_high: bool, urge_followed: bool) {
        match (predicted_high, urge_followed) {
            (true, true) => self.true_positive += 1,
            (false, false) => self.true_negative += 1,
            (true, false) => self.false_positive += 1,
            (false, true) => self.false_negative += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    /// (TP + TN) / total as a rounded percentage
    pub fn percent(&self) -> Option<u8> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let correct = (self.true_positive + self.true_negative) as f64;
        Some((100.0 * correct / total as f64).round() as u8)
    }
}

pub struct AccuracyEstimator<'a, S: EventStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: EventStore + ?Sized> AccuracyEstimator<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Replay snapshots whose validation window has fully elapsed
    pub fn tally(&self, now: DateTime<FixedOffset>) -> Result<AccuracyTally, RiskError> {
        let now_ms = now.timestamp_millis();
        let window_ms = self.config.accuracy_window_minutes as i64 * MS_PER_MINUTE;
        let since_ms = now_ms - self.config.accuracy_lookback_days as i64 * MS_PER_DAY;

        let mut tally = AccuracyTally::default();
        for snapshot in self.store.risk_snapshots(since_ms)? {
            let window_end = snapshot.timestamp + window_ms;
            if window_end > now_ms {
                continue;
            }
            let urges = self.store.count_events_in_range(
                EventType::UrgeLogged,
                snapshot.timestamp,
                window_end,
            )?;
            tally.record(snapshot.risk >= self.config.accuracy_threshold, urges > 0);
        }
        Ok(tally)
    }

    /// Accuracy percentage, or the fixed fallback with too few samples
    pub fn accuracy(&self, now: DateTime<FixedOffset>) -> u8 {
        let fallback = self.config.accuracy_fallback;
        let tally = or_fallback(self.tally(now), AccuracyTally::default(), "risk snapshots");
        if (tally.total() as usize) < self.config.accuracy_min_samples {
            log::debug!("accuracy: {} samples, using fallback {fallback}", tally.total());
            return fallback;
        }
        tally.percent().unwrap_or(fallback)
    }
}
