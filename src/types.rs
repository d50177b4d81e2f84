//! Core data types for relapse-risk estimation
//!
//! The onboarding profile and event log are owned by collaborating layers and
//! only read here; everything else is derived per call and never persisted by
//! the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of hourly buckets in a day
pub const HOURS_PER_DAY: u8 = 24;

/// Default self-reported urge duration in minutes
pub const DEFAULT_URGE_DURATION_MINUTES: u32 = 20;

/// Self-reported daily screen time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenTimeBucket {
    #[serde(rename = "<2 hours")]
    UnderTwoHours,
    #[serde(rename = "2-4 hours")]
    TwoToFourHours,
    #[serde(rename = "4-6 hours")]
    FourToSixHours,
    #[serde(rename = "6+ hours")]
    SixPlusHours,
}

impl ScreenTimeBucket {
    /// Risk added to every hour of the baseline curve
    pub fn penalty(&self) -> i32 {
        match self {
            ScreenTimeBucket::SixPlusHours => 10,
            ScreenTimeBucket::FourToSixHours => 5,
            ScreenTimeBucket::TwoToFourHours | ScreenTimeBucket::UnderTwoHours => 0,
        }
    }
}

/// Named day segment the user marked as risky
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskWindow {
    Morning,
    Afternoon,
    Evening,
    Latenight,
    Verylate,
}

impl RiskWindow {
    /// Hours of the day covered by this segment
    pub fn hours(&self) -> &'static [u8] {
        match self {
            RiskWindow::Morning => &[6, 7, 8, 9, 10, 11],
            RiskWindow::Afternoon => &[12, 13, 14, 15, 16, 17],
            RiskWindow::Evening => &[18, 19, 20, 21],
            RiskWindow::Latenight => &[22, 23, 0, 1],
            RiskWindow::Verylate => &[2, 3, 4, 5],
        }
    }
}

/// Self-reported relapse trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Stress,
    Loneliness,
    Boredom,
    Fatigue,
    SocialMedia,
}

impl Trigger {
    /// Hours boosted by this trigger and the size of the boost.
    ///
    /// Stress has no hour pattern of its own; it enters through check-ins.
    pub fn hour_bonus(&self) -> Option<(&'static [u8], i32)> {
        match self {
            Trigger::Loneliness => Some((&[20, 21, 22, 23, 0, 1, 2], 15)),
            Trigger::Fatigue => Some((&[22, 23, 0, 1, 2, 3], 15)),
            Trigger::Boredom => Some((&[12, 13, 14, 15, 20, 21, 22], 10)),
            Trigger::SocialMedia => Some((&[19, 20, 21, 22, 23, 0], 12)),
            Trigger::Stress => None,
        }
    }
}

/// How often the user is alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlonePattern {
    Always,
    Usually,
    Sometimes,
    Rarely,
}

impl AlonePattern {
    pub fn is_mostly_alone(&self) -> bool {
        matches!(self, AlonePattern::Always | AlonePattern::Usually)
    }
}

/// Which part of the week feels harder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPattern {
    Weekends,
    Weekdays,
    None,
}

/// Snapshot of the onboarding questionnaire.
///
/// Only the latest snapshot exists; re-onboarding replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub screen_time: ScreenTimeBucket,
    #[serde(default)]
    pub risk_windows: BTreeSet<RiskWindow>,
    #[serde(default)]
    pub triggers: BTreeSet<Trigger>,
    pub alone_pattern: AlonePattern,
    #[serde(default = "default_day_pattern")]
    pub day_pattern: DayPattern,
    #[serde(default = "default_urge_duration")]
    pub urge_duration_minutes: u32,
}

fn default_day_pattern() -> DayPattern {
    DayPattern::None
}

fn default_urge_duration() -> u32 {
    DEFAULT_URGE_DURATION_MINUTES
}

/// Three-band risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Classify a 0-100 risk score (HIGH >= 70, MODERATE >= 40)
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    /// Classify a probability (HIGH >= 0.7, LOW < 0.3)
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.7 {
            RiskLevel::High
        } else if probability < 0.3 {
            RiskLevel::Low
        } else {
            RiskLevel::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
        }
    }
}

/// One entry of the baseline curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRisk {
    pub hour: u8,
    pub base_risk: u8,
    pub risk_level: RiskLevel,
}

/// 24-entry hourly baseline risk curve, index == hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HourlyRiskProfile {
    hours: Vec<HourRisk>,
}

impl HourlyRiskProfile {
    /// Build a curve from 24 raw scores, clamping each to [5, 95]
    pub fn from_scores(scores: [i32; HOURS_PER_DAY as usize]) -> Self {
        let hours = scores
            .iter()
            .enumerate()
            .map(|(hour, &score)| {
                let base_risk = score.clamp(5, 95) as u8;
                HourRisk {
                    hour: hour as u8,
                    base_risk,
                    risk_level: RiskLevel::from_score(base_risk),
                }
            })
            .collect();
        Self { hours }
    }

    /// Flat curve with the same score every hour
    pub fn flat(score: i32) -> Self {
        Self::from_scores([score; HOURS_PER_DAY as usize])
    }

    /// Base risk at an hour of day (wraps modulo 24)
    pub fn risk_at(&self, hour: u32) -> u8 {
        self.hours[(hour % HOURS_PER_DAY as u32) as usize].base_risk
    }

    pub fn hours(&self) -> &[HourRisk] {
        &self.hours
    }
}

/// Recorded event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ScreenOn,
    ScreenOff,
    UrgeLogged,
    LapseLogged,
    SafetyCheckIn,
    InterventionShown,
    InterventionCompleted,
    EveningRoutineCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ScreenOn => "screen_on",
            EventType::ScreenOff => "screen_off",
            EventType::UrgeLogged => "urge_logged",
            EventType::LapseLogged => "lapse_logged",
            EventType::SafetyCheckIn => "safety_check_in",
            EventType::InterventionShown => "intervention_shown",
            EventType::InterventionCompleted => "intervention_completed",
            EventType::EveningRoutineCompleted => "evening_routine_completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "screen_on" => Some(EventType::ScreenOn),
            "screen_off" => Some(EventType::ScreenOff),
            "urge_logged" => Some(EventType::UrgeLogged),
            "lapse_logged" => Some(EventType::LapseLogged),
            "safety_check_in" => Some(EventType::SafetyCheckIn),
            "intervention_shown" => Some(EventType::InterventionShown),
            "intervention_completed" => Some(EventType::InterventionCompleted),
            "evening_routine_completed" => Some(EventType::EveningRoutineCompleted),
            _ => None,
        }
    }
}

/// Append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event_type: EventType, timestamp: i64) -> Self {
        Self {
            event_type,
            timestamp,
            metadata: None,
        }
    }
}

/// Worst contiguous span of the baseline curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub length: u8,
    pub avg_risk: u8,
    pub triggers: Vec<Trigger>,
}

/// Next forecast hour under the moderate threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeHarbor {
    pub safe_hour: u8,
    pub hours_until: u32,
    pub minutes_until: u32,
    pub label: String,
}

/// An intervention shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionLogEntry {
    #[serde(rename = "type")]
    pub intervention_type: String,
    pub shown_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub risk_at_show: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
}

/// A completed intervention session with self-rated urge intensity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    #[serde(rename = "type")]
    pub intervention_type: String,
    pub completed_at: i64,
    pub intensity_before: u8,
    pub intensity_after: u8,
}

/// Per-type effectiveness summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEffectiveness {
    #[serde(rename = "type")]
    pub intervention_type: String,
    pub mean_reduction: f64,
    pub count: u32,
}

/// Latest self-reported safety check-in (levels 0-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    pub timestamp: i64,
    pub stress_level: u8,
    #[serde(default)]
    pub loneliness_level: u8,
}

/// Live risk value recorded at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub timestamp: i64,
    pub risk: u8,
}

/// Recommended intervention type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub intervention_type: String,
    pub justification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_reduction: Option<f64>,
    pub sample_count: u32,
    /// All known types, most effective first
    pub ranked: Vec<SessionEffectiveness>,
}

/// Inputs to the logistic predictor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeatures {
    pub hour: u8,
    /// 0 = Sunday
    pub day_of_week: u8,
    pub screen_unlocks_last_hour: u32,
    pub evening_routine_done: bool,
    pub is_late_night: bool,
    pub is_recent_urge: bool,
    /// Context for confidence; only its bucket enters the cache key
    pub hours_since_last_urge: f64,
    pub stress_level: u8,
    pub loneliness_level: u8,
}

/// How much the predictor trusts its own estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Whether a factor raises or lowers risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorKind {
    Risk,
    Protective,
}

/// One line of the prediction explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub label: String,
    /// 0-100
    pub impact: u8,
    pub severity: Severity,
    pub kind: FactorKind,
}

/// Logistic prediction with explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub probability: f64,
    pub confidence: Confidence,
    pub risk_level: RiskLevel,
    pub factors: Vec<Factor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::High);

        assert_eq!(RiskLevel::from_probability(0.29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.3), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::High);
    }

    #[test]
    fn test_hourly_profile_clamps() {
        let mut scores = [50; 24];
        scores[3] = -10;
        scores[4] = 140;
        let profile = HourlyRiskProfile::from_scores(scores);

        assert_eq!(profile.risk_at(3), 5);
        assert_eq!(profile.risk_at(4), 95);
        assert_eq!(profile.hours()[4].risk_level, RiskLevel::High);
        assert_eq!(profile.risk_at(27), 5);
    }

    #[test]
    fn test_profile_deserialization_defaults() {
        let json = r#"{
            "screen_time": "6+ hours",
            "risk_windows": ["latenight", "evening"],
            "triggers": ["social-media"],
            "alone_pattern": "usually"
        }"#;

        let profile: OnboardingProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.screen_time, ScreenTimeBucket::SixPlusHours);
        assert!(profile.triggers.contains(&Trigger::SocialMedia));
        assert_eq!(profile.day_pattern, DayPattern::None);
        assert_eq!(profile.urge_duration_minutes, 20);
    }

    #[test]
    fn test_event_type_names() {
        for event_type in [
            EventType::ScreenOn,
            EventType::UrgeLogged,
            EventType::InterventionShown,
            EventType::EveningRoutineCompleted,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }

        let event: Event =
            serde_json::from_str(r#"{"type":"lapse_logged","timestamp":5}"#).unwrap();
        assert_eq!(event.event_type, EventType::LapseLogged);
        assert!(event.metadata.is_none());
    }
}
