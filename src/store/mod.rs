//! Event and profile store contract
//!
//! The engine only reads through [`EventStore`]. Writes (profile replacement,
//! event appends, intervention logging) belong to the logging layer and are
//! exposed as inherent methods on each concrete store.

use crate::error::RiskError;
use crate::types::{CheckIn, EventType, OnboardingProfile, RiskSnapshot, SessionEffectiveness};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod migrations;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{EventLog, MemoryStore};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_HOUR: i64 = 3_600_000;
pub const MS_PER_DAY: i64 = 86_400_000;

/// Widest real-world UTC offset, in minutes (UTC-14:00 / UTC+14:00)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Read-only query contract consumed by the estimators.
///
/// Time bounds are epoch milliseconds; ranges are half-open `[from, to)`.
pub trait EventStore {
    /// Offset used to bucket events into local hours of day
    fn utc_offset_minutes(&self) -> i32;

    /// The single latest onboarding snapshot, if onboarding happened
    fn latest_profile(&self) -> Result<Option<OnboardingProfile>, RiskError>;

    /// Events of a type at or after `since_ms`
    fn count_events(&self, event_type: EventType, since_ms: i64) -> Result<u32, RiskError>;

    fn count_events_in_range(
        &self,
        event_type: EventType,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<u32, RiskError>;

    /// Events of a type falling in local `hour` within `[since_ms, until_ms)`,
    /// divided by the number of days the range spans
    fn avg_daily_event_count_for_hour(
        &self,
        event_type: EventType,
        hour: u8,
        since_ms: i64,
        until_ms: i64,
    ) -> Result<f64, RiskError>;

    /// Timestamp of the most recent event of a type
    fn last_event_at(&self, event_type: EventType) -> Result<Option<i64>, RiskError>;

    /// Completed sessions grouped by intervention type (unordered)
    fn session_effectiveness(&self) -> Result<Vec<SessionEffectiveness>, RiskError>;

    /// Most recent check-in at or after `since_ms`
    fn recent_check_in(&self, since_ms: i64) -> Result<Option<CheckIn>, RiskError>;

    /// Interventions shown at or after `since_ms`
    fn count_interventions_shown(&self, since_ms: i64) -> Result<u32, RiskError>;

    /// Recorded live-risk snapshots at or after `since_ms`, oldest first
    fn risk_snapshots(&self, since_ms: i64) -> Result<Vec<RiskSnapshot>, RiskError>;
}

impl<S: EventStore + ?Sized> EventStore for &S {
    fn utc_offset_minutes(&self) -> i32 {
        (**self).utc_offset_minutes()
    }

    fn latest_profile(&self) -> Result<Option<OnboardingProfile>, RiskError> {
        (**self).latest_profile()
    }

    fn count_events(&self, event_type: EventType, since_ms: i64) -> Result<u32, RiskError> {
        (**self).count_events(event_type, since_ms)
    }

    fn count_events_in_range(
        &self,
        event_type: EventType,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<u32, RiskError> {
        (**self).count_events_in_range(event_type, from_ms, to_ms)
    }

    fn avg_daily_event_count_for_hour(
        &self,
        event_type: EventType,
        hour: u8,
        since_ms: i64,
        until_ms: i64,
    ) -> Result<f64, RiskError> {
        (**self).avg_daily_event_count_for_hour(event_type, hour, since_ms, until_ms)
    }

    fn last_event_at(&self, event_type: EventType) -> Result<Option<i64>, RiskError> {
        (**self).last_event_at(event_type)
    }

    fn session_effectiveness(&self) -> Result<Vec<SessionEffectiveness>, RiskError> {
        (**self).session_effectiveness()
    }

    fn recent_check_in(&self, since_ms: i64) -> Result<Option<CheckIn>, RiskError> {
        (**self).recent_check_in(since_ms)
    }

    fn count_interventions_shown(&self, since_ms: i64) -> Result<u32, RiskError> {
        (**self).count_interventions_shown(since_ms)
    }

    fn risk_snapshots(&self, since_ms: i64) -> Result<Vec<RiskSnapshot>, RiskError> {
        (**self).risk_snapshots(since_ms)
    }
}

/// One named attempt in a layered read
pub type ReadAttempt<'a, T> = (&'a str, &'a dyn Fn() -> Result<T, RiskError>);

/// Run attempts in precedence order and return the first success.
///
/// Used where the schema may predate optional columns: the enriched query
/// goes first, reduced ones follow. Returns the last error if all fail.
pub fn read_layered<T>(what: &str, attempts: &[ReadAttempt<'_, T>]) -> Result<T, RiskError> {
    let mut last_error = RiskError::Query(format!("no read attempts for {what}"));
    for (name, attempt) in attempts {
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) => {
                log::debug!("{what}: '{name}' read failed, trying next: {err}");
                last_error = err;
            }
        }
    }
    Err(last_error)
}

/// Unwrap a store read, logging and substituting `fallback` on failure
pub fn or_fallback<T>(result: Result<T, RiskError>, fallback: T, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::warn!("{what} unavailable, using fallback: {err}");
            fallback
        }
    }
}

/// Accept a UTC offset only if it is one a device clock can report
pub fn check_utc_offset(utc_offset_minutes: i32) -> Result<i32, RiskError> {
    if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&utc_offset_minutes) {
        return Err(RiskError::InvalidInput(format!(
            "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {utc_offset_minutes}"
        )));
    }
    Ok(utc_offset_minutes)
}

/// Local hour of day (0-23) for an epoch-millisecond timestamp
pub fn local_hour(timestamp_ms: i64, utc_offset_secs: i32) -> u8 {
    let local_secs = timestamp_ms.div_euclid(1000) + utc_offset_secs as i64;
    (local_secs.rem_euclid(86_400) / 3_600) as u8
}

/// Whole days spanned by `[since_ms, until_ms)`, at least one
pub fn days_spanned(since_ms: i64, until_ms: i64) -> i64 {
    let span = (until_ms - since_ms).max(0);
    ((span + MS_PER_DAY - 1) / MS_PER_DAY).max(1)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_layered_takes_first_success() {
        let enriched = || -> Result<u32, RiskError> { Err(RiskError::MissingColumn("x".into())) };
        let reduced = || -> Result<u32, RiskError> { Ok(7) };
        let never = || -> Result<u32, RiskError> { Ok(99) };

        let attempts: [ReadAttempt<'_, u32>; 3] =
            [("enriched", &enriched), ("reduced", &reduced), ("never", &never)];
        let value = read_layered("test", &attempts).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_read_layered_returns_last_error() {
        let first = || -> Result<u32, RiskError> { Err(RiskError::Query("first".into())) };
        let second = || -> Result<u32, RiskError> { Err(RiskError::Query("second".into())) };

        let attempts: [ReadAttempt<'_, u32>; 2] = [("a", &first), ("b", &second)];
        let err = read_layered("test", &attempts).unwrap_err();
        assert_eq!(err.to_string(), "Query failed: second");
    }

    #[test]
    fn test_or_fallback() {
        let failed: Result<u8, RiskError> = Err(RiskError::StoreUnavailable("down".into()));
        assert_eq!(or_fallback(failed, 20, "live risk"), 20);
        assert_eq!(or_fallback(Ok(55), 20, "live risk"), 55);
    }

    #[test]
    fn test_local_hour_with_offset() {
        // 2024-01-15T14:30:00Z
        let ts = 1_705_329_000_000;
        assert_eq!(local_hour(ts, 0), 14);
        assert_eq!(local_hour(ts, -5 * 3600), 9);
        assert_eq!(local_hour(ts, 10 * 3600), 0);
    }

    #[test]
    fn test_check_utc_offset_bounds() {
        assert_eq!(check_utc_offset(-300).unwrap(), -300);
        assert_eq!(check_utc_offset(MAX_UTC_OFFSET_MINUTES).unwrap(), 840);
        assert!(matches!(check_utc_offset(841), Err(RiskError::InvalidInput(_))));
        assert!(matches!(check_utc_offset(i32::MIN), Err(RiskError::InvalidInput(_))));
    }

    #[test]
    fn test_days_spanned() {
        assert_eq!(days_spanned(0, 7 * MS_PER_DAY), 7);
        assert_eq!(days_spanned(0, 7 * MS_PER_DAY + 1), 8);
        assert_eq!(days_spanned(10, 10), 1);
    }
}
