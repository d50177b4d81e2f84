//! Live risk aggregation
//!
//! Two estimators feed the "current risk" value: the baseline curve at the
//! current hour, and how often the screen comes on at this hour across the
//! trailing week. Spike paths add short-horizon boosts after logged urges.
//! Nothing here writes; failed reads degrade to the profile estimate or 20.

use chrono::{DateTime, Duration, FixedOffset, Timelike};

use crate::config::EngineConfig;
use crate::error::RiskError;
use crate::store::{or_fallback, EventStore, MS_PER_DAY, MS_PER_MINUTE};
use crate::types::{EventType, HourlyRiskProfile};

/// Frequency estimate when there is no usable data
pub const BASELINE_LIVE_RISK: u8 = 20;

/// Ceiling of the frequency curve
const FREQUENCY_RISK_CAP: f64 = 90.0;

/// Map an average daily event count for one hour onto a 0-90 risk score.
///
/// ```text
/// n = 0        -> 20
/// 0 < n <= 2   -> 20 + 5n
/// 2 < n <= 5   -> 30 + 6.67(n - 2)
/// 5 < n <= 9   -> 50 + 5(n - 5)
/// n > 9        -> 70 + min(4(n - 9), 20)
/// ```
pub fn frequency_to_risk(avg_events: f64) -> u8 {
    let n = if avg_events.is_finite() { avg_events.max(0.0) } else { 0.0 };
    let risk = if n == 0.0 {
        20.0
    } else if n <= 2.0 {
        20.0 + 5.0 * n
    } else if n <= 5.0 {
        30.0 + 6.67 * (n - 2.0)
    } else if n <= 9.0 {
        50.0 + 5.0 * (n - 5.0)
    } else {
        70.0 + (4.0 * (n - 9.0)).min(20.0)
    };
    risk.clamp(0.0, FREQUENCY_RISK_CAP).round() as u8
}

/// Weighted blend of the two estimators, clamped to 0-100
pub fn blend(frequency: u8, profile: u8, frequency_weight: f64) -> u8 {
    let blended = frequency_weight * frequency as f64 + (1.0 - frequency_weight) * profile as f64;
    clamp_risk(blended.round())
}

/// Clamp any intermediate score into 0-100
pub fn clamp_risk(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0) as u8
}

/// Reads recent events and combines them with the baseline curve
pub struct LiveRiskAggregator<'a, S: EventStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: EventStore + ?Sized> LiveRiskAggregator<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Baseline curve value at the current hour
    pub fn profile_hour_risk(&self, profile: &HourlyRiskProfile, now: DateTime<FixedOffset>) -> u8 {
        profile.risk_at(now.hour())
    }

    /// Frequency estimate for an arbitrary hour of day
    pub fn try_frequency_risk_at(
        &self,
        hour: u8,
        now: DateTime<FixedOffset>,
    ) -> Result<u8, RiskError> {
        let until_ms = now.timestamp_millis();
        let since_ms = until_ms - self.config.frequency_lookback_days as i64 * MS_PER_DAY;
        let avg = self.store.avg_daily_event_count_for_hour(
            EventType::ScreenOn,
            hour,
            since_ms,
            until_ms,
        )?;
        Ok(frequency_to_risk(avg))
    }

    /// Frequency estimate for the current hour, 20 when unreadable
    pub fn frequency_risk(&self, now: DateTime<FixedOffset>) -> u8 {
        or_fallback(
            self.try_frequency_risk_at(now.hour() as u8, now),
            BASELINE_LIVE_RISK,
            "screen-on frequency",
        )
    }

    /// Blended live risk used for display and gating.
    ///
    /// Falls back to the profile-hour estimate when event counts are unreadable.
    pub fn live_risk(&self, profile: &HourlyRiskProfile, now: DateTime<FixedOffset>) -> u8 {
        let profile_risk = self.profile_hour_risk(profile, now);
        let live = match self.try_frequency_risk_at(now.hour() as u8, now) {
            Ok(frequency_risk) => blend(frequency_risk, profile_risk, self.config.frequency_weight),
            Err(err) => {
                log::warn!("screen-on frequency unavailable, using profile estimate: {err}");
                profile_risk
            }
        };
        log::debug!("live risk {live} (profile {profile_risk})");
        live
    }

    /// Duration-aware spike: +15 per urge or lapse inside the user's urge
    /// duration, at most +30, on top of `baseline`
    pub fn spike_risk(
        &self,
        baseline: u8,
        urge_duration_minutes: u32,
        now: DateTime<FixedOffset>,
    ) -> u8 {
        let since_ms = (now - Duration::minutes(urge_duration_minutes as i64)).timestamp_millis();
        let urges = or_fallback(
            self.store.count_events(EventType::UrgeLogged, since_ms),
            0,
            "recent urges",
        );
        let lapses = or_fallback(
            self.store.count_events(EventType::LapseLogged, since_ms),
            0,
            "recent lapses",
        );
        let bonus = spike_bonus(urges + lapses, self.config.spike_per_event, self.config.spike_cap);
        clamp_risk(baseline as f64 + bonus as f64)
    }

    /// Assessment shown right after a log action: a flat bump when an urge
    /// was logged within the recent-urge window, capped (never lowered below
    /// `baseline`)
    pub fn current_assessment(&self, baseline: u8, now: DateTime<FixedOffset>) -> u8 {
        let since_ms =
            now.timestamp_millis() - self.config.recent_urge_window_minutes as i64 * MS_PER_MINUTE;
        let recent = or_fallback(
            self.store.count_events(EventType::UrgeLogged, since_ms),
            0,
            "recent urges",
        );
        if recent == 0 {
            return clamp_risk(baseline as f64);
        }
        let bumped = (baseline as u32 + self.config.recent_urge_bonus as u32)
            .min(self.config.recent_urge_cap as u32)
            .max(baseline as u32);
        clamp_risk(bumped as f64)
    }
}

/// Spike contribution for a number of recent urge/lapse events
pub fn spike_bonus(events: u32, per_event: u8, cap: u8) -> u8 {
    events
        .saturating_mul(per_event as u32)
        .min(cap as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::UnavailableStore;
    use crate::store::{MemoryStore, MS_PER_HOUR};
    use crate::types::Event;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_frequency_curve_pieces() {
        assert_eq!(frequency_to_risk(0.0), 20);
        assert_eq!(frequency_to_risk(1.0), 25);
        assert_eq!(frequency_to_risk(2.0), 30);
        assert_eq!(frequency_to_risk(4.0), 43);
        assert_eq!(frequency_to_risk(5.0), 50);
        assert_eq!(frequency_to_risk(7.0), 60);
        assert_eq!(frequency_to_risk(9.0), 70);
        assert_eq!(frequency_to_risk(11.0), 78);
        assert_eq!(frequency_to_risk(40.0), 90);
        assert_eq!(frequency_to_risk(-3.0), 20);
        assert_eq!(frequency_to_risk(f64::NAN), 20);
    }

    #[test]
    fn test_blend_weights() {
        assert_eq!(blend(78, 25, 0.6), 57);
        assert_eq!(blend(20, 60, 0.6), 36);
        assert_eq!(blend(90, 95, 1.0), 90);
    }

    #[test]
    fn test_no_screen_events_gives_baseline_frequency() {
        let store = MemoryStore::new(0);
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&store, &config);
        assert_eq!(aggregator.frequency_risk(at(14, 0)), 20);
    }

    #[test]
    fn test_eleven_daily_unlocks_maps_to_78() {
        let store = MemoryStore::new(0);
        let now = at(14, 30);
        for day in 0..7 {
            let hour_start = now.timestamp_millis() - day * MS_PER_DAY - 30 * MS_PER_MINUTE;
            for i in 0..11 {
                store.append_event(Event::new(EventType::ScreenOn, hour_start + i * MS_PER_MINUTE));
            }
        }
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&store, &config);

        assert_eq!(aggregator.frequency_risk(now), 78);
        // 0.6 * 78 + 0.4 * 20
        assert_eq!(aggregator.live_risk(&HourlyRiskProfile::flat(20), now), 55);
    }

    #[test]
    fn test_live_risk_falls_back_to_profile_hour() {
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&UnavailableStore, &config);
        let mut scores = [25; 24];
        scores[22] = 60;
        let profile = HourlyRiskProfile::from_scores(scores);

        assert_eq!(aggregator.live_risk(&profile, at(22, 10)), 60);
        assert_eq!(aggregator.frequency_risk(at(22, 10)), 20);
        assert_eq!(aggregator.spike_risk(40, 20, at(22, 10)), 40);
        assert_eq!(aggregator.current_assessment(40, at(22, 10)), 40);
    }

    #[test]
    fn test_spike_is_capped_at_thirty() {
        let store = MemoryStore::new(0);
        let now = at(21, 0);
        for minutes_ago in [2, 5, 9, 15] {
            store.append_event(Event::new(
                EventType::UrgeLogged,
                now.timestamp_millis() - minutes_ago * MS_PER_MINUTE,
            ));
        }
        // Outside a 20-minute urge duration
        store.append_event(Event::new(
            EventType::LapseLogged,
            now.timestamp_millis() - 45 * MS_PER_MINUTE,
        ));
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&store, &config);

        assert_eq!(aggregator.spike_risk(50, 20, now), 80);
        assert_eq!(aggregator.spike_risk(85, 20, now), 100);
        // A one-hour urge duration also sees the lapse, still capped
        assert_eq!(aggregator.spike_risk(10, 60, now), 40);
    }

    #[test]
    fn test_single_event_spike() {
        let store = MemoryStore::new(0);
        let now = at(21, 0);
        store.append_event(Event::new(
            EventType::LapseLogged,
            now.timestamp_millis() - 10 * MS_PER_MINUTE,
        ));
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&store, &config);
        assert_eq!(aggregator.spike_risk(30, 20, now), 45);
        assert_eq!(aggregator.spike_risk(30, 5, now), 30);
    }

    #[test]
    fn test_recent_urge_bump() {
        let store = MemoryStore::new(0);
        let now = at(9, 0);
        store.append_event(Event::new(
            EventType::UrgeLogged,
            now.timestamp_millis() - 90_000,
        ));
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&store, &config);

        assert_eq!(aggregator.current_assessment(40, now), 55);
        assert_eq!(aggregator.current_assessment(88, now), 95);
        assert_eq!(aggregator.current_assessment(97, now), 97);
        // Ten minutes later the bump is gone
        let later = now + Duration::minutes(10);
        assert_eq!(aggregator.current_assessment(40, later), 40);
    }

    #[test]
    fn test_spike_bonus_saturates() {
        assert_eq!(spike_bonus(0, 15, 30), 0);
        assert_eq!(spike_bonus(1, 15, 30), 15);
        assert_eq!(spike_bonus(u32::MAX, 15, 30), 30);
    }

    #[test]
    fn test_try_frequency_for_other_hour() {
        let store = MemoryStore::new(0);
        let now = at(8, 0);
        let ts = now.timestamp_millis() - MS_PER_DAY + 2 * MS_PER_HOUR;
        for _ in 0..14 {
            store.append_event(Event::new(EventType::ScreenOn, ts));
        }
        let config = EngineConfig::default();
        let aggregator = LiveRiskAggregator::new(&store, &config);
        // 14 events at 10:00 over 7 days = 2/day
        assert_eq!(aggregator.try_frequency_risk_at(10, now).unwrap(), 30);
    }
}
