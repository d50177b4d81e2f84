//! Feature extraction for the logistic predictor
//!
//! Each field is read independently; a failed read falls back to its own
//! default (0, false, or 24 hours since the last urge) without affecting the
//! others.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::config::EngineConfig;
use crate::store::{or_fallback, EventStore, MS_PER_HOUR};
use crate::types::{EventType, PredictionFeatures};

/// Assumed gap since the last urge when none is known
pub const DEFAULT_HOURS_SINCE_URGE: f64 = 24.0;

/// An urge inside this many hours puts the user in the refractory period
pub const RECENT_URGE_HOURS: f64 = 2.0;

/// Late night runs from 22:00 through the 4 o'clock hour
pub fn is_late_night(hour: u8) -> bool {
    hour >= 22 || hour <= 4
}

/// Epoch ms of the most recent local midnight
pub fn start_of_day_ms(now: DateTime<FixedOffset>) -> i64 {
    now.timestamp_millis()
        - now.num_seconds_from_midnight() as i64 * 1000
        - now.timestamp_subsec_millis() as i64
}

/// Build the feature vector for `now`
pub fn extract_features<S: EventStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    now: DateTime<FixedOffset>,
) -> PredictionFeatures {
    let now_ms = now.timestamp_millis();
    let hour = now.hour() as u8;

    let screen_unlocks_last_hour = or_fallback(
        store.count_events(EventType::ScreenOn, now_ms - MS_PER_HOUR),
        0,
        "screen unlocks",
    );

    let evening_routine_done = or_fallback(
        store.count_events(EventType::EveningRoutineCompleted, start_of_day_ms(now)),
        0,
        "evening routine",
    ) > 0;

    let hours_since_last_urge = match or_fallback(
        store.last_event_at(EventType::UrgeLogged),
        None,
        "last urge",
    ) {
        Some(ts) => (now_ms - ts).max(0) as f64 / MS_PER_HOUR as f64,
        None => DEFAULT_HOURS_SINCE_URGE,
    };

    let check_in_since = now_ms - config.check_in_max_age_hours as i64 * MS_PER_HOUR;
    let check_in = or_fallback(store.recent_check_in(check_in_since), None, "check-in");

    PredictionFeatures {
        hour,
        day_of_week: now.weekday().num_days_from_sunday() as u8,
        screen_unlocks_last_hour,
        evening_routine_done,
        is_late_night: is_late_night(hour),
        is_recent_urge: hours_since_last_urge < RECENT_URGE_HOURS,
        hours_since_last_urge,
        stress_level: check_in.map(|c| c.stress_level).unwrap_or(0),
        loneliness_level: check_in.map(|c| c.loneliness_level).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::UnavailableStore;
    use crate::store::{MemoryStore, MS_PER_MINUTE};
    use crate::types::{CheckIn, Event};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, day, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_late_night_bounds() {
        assert!(is_late_night(22));
        assert!(is_late_night(0));
        assert!(is_late_night(4));
        assert!(!is_late_night(5));
        assert!(!is_late_night(21));
    }

    #[test]
    fn test_start_of_day() {
        let now = at(15, 14, 30);
        assert_eq!(start_of_day_ms(now), at(15, 0, 0).timestamp_millis());
    }

    #[test]
    fn test_extract_from_log() {
        let store = MemoryStore::new(0);
        // Saturday 2024-01-20, 23:10
        let now = at(20, 23, 10);
        let now_ms = now.timestamp_millis();

        for i in 0..12 {
            store.append_event(Event::new(EventType::ScreenOn, now_ms - i * 4 * MS_PER_MINUTE));
        }
        // Older than an hour
        store.append_event(Event::new(EventType::ScreenOn, now_ms - 2 * MS_PER_HOUR));
        store.append_event(Event::new(EventType::UrgeLogged, now_ms - 30 * MS_PER_MINUTE));
        // Yesterday's routine does not count
        store.append_event(Event::new(
            EventType::EveningRoutineCompleted,
            at(19, 21, 0).timestamp_millis(),
        ));
        store.record_check_in(CheckIn {
            timestamp: now_ms - 3 * MS_PER_HOUR,
            stress_level: 7,
            loneliness_level: 5,
        });

        let features = extract_features(&store, &EngineConfig::default(), now);
        assert_eq!(features.hour, 23);
        assert_eq!(features.day_of_week, 6);
        assert_eq!(features.screen_unlocks_last_hour, 12);
        assert!(!features.evening_routine_done);
        assert!(features.is_late_night);
        assert!(features.is_recent_urge);
        assert!((features.hours_since_last_urge - 0.5).abs() < 1e-9);
        assert_eq!(features.stress_level, 7);
        assert_eq!(features.loneliness_level, 5);
    }

    #[test]
    fn test_stale_check_in_ignored() {
        let store = MemoryStore::new(0);
        let now = at(15, 12, 0);
        store.record_check_in(CheckIn {
            timestamp: now.timestamp_millis() - 30 * MS_PER_HOUR,
            stress_level: 9,
            loneliness_level: 9,
        });
        store.append_event(Event::new(
            EventType::EveningRoutineCompleted,
            at(15, 0, 5).timestamp_millis(),
        ));

        let features = extract_features(&store, &EngineConfig::default(), now);
        assert_eq!(features.stress_level, 0);
        assert!(features.evening_routine_done);
        assert_eq!(features.day_of_week, 1);
    }

    #[test]
    fn test_every_field_falls_back() {
        let now = at(15, 10, 0);
        let features = extract_features(&UnavailableStore, &EngineConfig::default(), now);

        assert_eq!(features.hour, 10);
        assert_eq!(features.screen_unlocks_last_hour, 0);
        assert!(!features.evening_routine_done);
        assert_eq!(features.hours_since_last_urge, DEFAULT_HOURS_SINCE_URGE);
        assert!(!features.is_recent_urge);
        assert_eq!(features.stress_level, 0);
        assert_eq!(features.loneliness_level, 0);
    }
}
