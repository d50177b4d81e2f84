//! Baseline risk curve construction
//!
//! Turns the onboarding snapshot into a 24-hour risk curve. The curve depends
//! only on the profile, never on logged events.

use crate::store::{or_fallback, EventStore};
use crate::types::{HourlyRiskProfile, OnboardingProfile, HOURS_PER_DAY};

/// Starting risk for every hour
const FLOOR_RISK: i32 = 15;

/// Added to each hour of a selected risk window
const RISK_WINDOW_BONUS: i32 = 35;

/// Added to every hour when the user is mostly alone
const ALONE_BONUS: i32 = 8;

/// Flat curve used before onboarding
pub const DEFAULT_PROFILE_RISK: i32 = 20;

/// Builder for the hourly baseline curve
pub struct BaselineProfileBuilder;

impl BaselineProfileBuilder {
    /// Build the curve for a profile, or the flat default when there is none.
    ///
    /// Pure: the same profile always yields the same curve.
    pub fn build(profile: Option<&OnboardingProfile>) -> HourlyRiskProfile {
        let Some(profile) = profile else {
            return HourlyRiskProfile::flat(DEFAULT_PROFILE_RISK);
        };

        let mut scores = [FLOOR_RISK; HOURS_PER_DAY as usize];

        for window in &profile.risk_windows {
            add_to_hours(&mut scores, window.hours(), RISK_WINDOW_BONUS);
        }

        let screen_penalty = profile.screen_time.penalty();
        scores.iter_mut().for_each(|s| *s += screen_penalty);

        for trigger in &profile.triggers {
            if let Some((hours, bonus)) = trigger.hour_bonus() {
                add_to_hours(&mut scores, hours, bonus);
            }
        }

        if profile.alone_pattern.is_mostly_alone() {
            scores.iter_mut().for_each(|s| *s += ALONE_BONUS);
        }

        HourlyRiskProfile::from_scores(scores)
    }

    /// Build from the store's latest snapshot; a failed read yields the flat default
    pub fn from_store<S: EventStore + ?Sized>(store: &S) -> HourlyRiskProfile {
        let profile = or_fallback(store.latest_profile(), None, "onboarding profile");
        Self::build(profile.as_ref())
    }
}

fn add_to_hours(scores: &mut [i32; HOURS_PER_DAY as usize], hours: &[u8], bonus: i32) {
    for &hour in hours {
        scores[(hour % HOURS_PER_DAY) as usize] += bonus;
    }
}
