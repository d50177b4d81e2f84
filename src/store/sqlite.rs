//! SQLite-backed event store
//!
//! Older databases may lack optional columns added in later schema versions.
//! Reads that touch those columns go through [`read_layered`] with the
//! enriched query first and reduced queries after it.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::RiskError;
use crate::store::migrations::{run_migrations, schema_version};
use crate::store::{days_spanned, read_layered, EventStore, ReadAttempt};
use crate::types::{
    CheckIn, CompletedSession, Event, EventType, InterventionLogEntry, OnboardingProfile,
    RiskSnapshot, SessionEffectiveness, DEFAULT_URGE_DURATION_MINUTES,
};

/// Profile queries in precedence order
pub const PROFILE_FIELD_SETS: &[(&str, &str)] = &[
    (
        "with_urge_duration",
        "SELECT screen_time, risk_windows, triggers, alone_pattern, day_pattern,
                urge_duration_minutes
         FROM onboarding_profile ORDER BY created_at DESC LIMIT 1",
    ),
    (
        "base",
        "SELECT screen_time, risk_windows, triggers, alone_pattern, day_pattern
         FROM onboarding_profile ORDER BY created_at DESC LIMIT 1",
    ),
];

/// Check-in queries in precedence order
pub const CHECK_IN_FIELD_SETS: &[(&str, &str)] = &[
    (
        "with_loneliness",
        "SELECT timestamp, stress_level, loneliness_level
         FROM check_ins WHERE timestamp >= ?1 ORDER BY timestamp DESC LIMIT 1",
    ),
    (
        "stress_only",
        "SELECT timestamp, stress_level
         FROM check_ins WHERE timestamp >= ?1 ORDER BY timestamp DESC LIMIT 1",
    ),
];

struct ProfileRow {
    screen_time: String,
    risk_windows: String,
    triggers: String,
    alone_pattern: String,
    day_pattern: String,
    urge_duration_minutes: Option<u32>,
}

impl ProfileRow {
    fn into_profile(self) -> Result<OnboardingProfile, RiskError> {
        Ok(OnboardingProfile {
            screen_time: serde_json::from_str(&self.screen_time)?,
            risk_windows: serde_json::from_str(&self.risk_windows)?,
            triggers: serde_json::from_str(&self.triggers)?,
            alone_pattern: serde_json::from_str(&self.alone_pattern)?,
            day_pattern: serde_json::from_str(&self.day_pattern)?,
            urge_duration_minutes: self
                .urge_duration_minutes
                .unwrap_or(DEFAULT_URGE_DURATION_MINUTES),
        })
    }
}

fn query_profile(conn: &Connection, sql: &str) -> Result<Option<OnboardingProfile>, RiskError> {
    let mut stmt = conn.prepare(sql)?;
    let with_duration = stmt.column_count() > 5;
    let row = stmt
        .query_row([], |row| {
            Ok(ProfileRow {
                screen_time: row.get(0)?,
                risk_windows: row.get(1)?,
                triggers: row.get(2)?,
                alone_pattern: row.get(3)?,
                day_pattern: row.get(4)?,
                urge_duration_minutes: if with_duration { Some(row.get(5)?) } else { None },
            })
        })
        .optional()?;
    row.map(ProfileRow::into_profile).transpose()
}

fn query_check_in(
    conn: &Connection,
    sql: &str,
    since_ms: i64,
) -> Result<Option<CheckIn>, RiskError> {
    let mut stmt = conn.prepare(sql)?;
    let with_loneliness = stmt.column_count() > 2;
    let check_in = stmt
        .query_row(params![since_ms], |row| {
            Ok(CheckIn {
                timestamp: row.get(0)?,
                stress_level: row.get(1)?,
                loneliness_level: if with_loneliness { row.get(2)? } else { 0 },
            })
        })
        .optional()?;
    Ok(check_in)
}

/// Event store persisted in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
    utc_offset_secs: i32,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate a database file
    pub fn open(path: impl AsRef<Path>, utc_offset_minutes: i32) -> Result<Self, RiskError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            log::warn!("failed to enable WAL mode: {err}");
        }
        run_migrations(&mut conn)?;
        Ok(Self::from_connection(conn, utc_offset_minutes))
    }

    pub fn open_in_memory(utc_offset_minutes: i32) -> Result<Self, RiskError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self::from_connection(conn, utc_offset_minutes))
    }

    /// Wrap an existing connection as-is, without migrating it
    pub fn from_connection(conn: Connection, utc_offset_minutes: i32) -> Self {
        Self {
            conn: Mutex::new(conn),
            utc_offset_secs: utc_offset_minutes.saturating_mul(60),
        }
    }

    pub fn schema_version(&self) -> Result<i32, RiskError> {
        schema_version(&self.conn())
    }

    /// Drop the previous onboarding snapshot and store this one
    pub fn replace_profile(
        &self,
        profile: &OnboardingProfile,
        now_ms: i64,
    ) -> Result<(), RiskError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM onboarding_profile", [])?;
        tx.execute(
            "INSERT INTO onboarding_profile
                (id, screen_time, risk_windows, triggers, alone_pattern, day_pattern,
                 urge_duration_minutes, created_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                serde_json::to_string(&profile.screen_time)?,
                serde_json::to_string(&profile.risk_windows)?,
                serde_json::to_string(&profile.triggers)?,
                serde_json::to_string(&profile.alone_pattern)?,
                serde_json::to_string(&profile.day_pattern)?,
                profile.urge_duration_minutes,
                now_ms,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn append_event(&self, event: &Event) -> Result<(), RiskError> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn().execute(
            "INSERT INTO events (type, timestamp, metadata) VALUES (?1, ?2, ?3)",
            params![event.event_type.as_str(), event.timestamp, metadata],
        )?;
        Ok(())
    }

    pub fn log_intervention(&self, entry: &InterventionLogEntry) -> Result<(), RiskError> {
        self.conn().execute(
            "INSERT INTO interventions
                (type, shown_at, completed_at, risk_at_show, helped, duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.intervention_type,
                entry.shown_at,
                entry.completed_at,
                entry.risk_at_show,
                entry.helped,
                entry.duration_seconds,
            ],
        )?;
        Ok(())
    }

    pub fn record_session(&self, session: &CompletedSession) -> Result<(), RiskError> {
        self.conn().execute(
            "INSERT INTO intervention_sessions
                (type, completed_at, intensity_before, intensity_after)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.intervention_type,
                session.completed_at,
                session.intensity_before,
                session.intensity_after,
            ],
        )?;
        Ok(())
    }

    pub fn record_check_in(&self, check_in: &CheckIn) -> Result<(), RiskError> {
        self.conn().execute(
            "INSERT INTO check_ins (timestamp, stress_level, loneliness_level) VALUES (?1, ?2, ?3)",
            params![check_in.timestamp, check_in.stress_level, check_in.loneliness_level],
        )?;
        Ok(())
    }

    pub fn record_risk_snapshot(&self, snapshot: &RiskSnapshot) -> Result<(), RiskError> {
        self.conn().execute(
            "INSERT INTO risk_snapshots (timestamp, risk) VALUES (?1, ?2)",
            params![snapshot.timestamp, snapshot.risk],
        )?;
        Ok(())
    }

    /// Explicit full data wipe
    pub fn wipe(&self) -> Result<(), RiskError> {
        self.conn().execute_batch(
            "DELETE FROM onboarding_profile;
             DELETE FROM events;
             DELETE FROM interventions;
             DELETE FROM intervention_sessions;
             DELETE FROM check_ins;
             DELETE FROM risk_snapshots;",
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl EventStore for SqliteStore {
    fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_secs / 60
    }

    fn latest_profile(&self) -> Result<Option<OnboardingProfile>, RiskError> {
        let conn = self.conn();
        let readers: Vec<_> = PROFILE_FIELD_SETS
            .iter()
            .map(|(name, sql)| {
                let conn: &Connection = &conn;
                (*name, move || query_profile(conn, sql))
            })
            .collect();
        let attempts: Vec<ReadAttempt<'_, Option<OnboardingProfile>>> = readers
            .iter()
            .map(|(name, read)| {
                (*name, read as &dyn Fn() -> Result<Option<OnboardingProfile>, RiskError>)
            })
            .collect();
        read_layered("onboarding profile", &attempts)
    }

    fn count_events(&self, event_type: EventType, since_ms: i64) -> Result<u32, RiskError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE type = ?1 AND timestamp >= ?2",
            params![event_type.as_str(), since_ms],
            |row| row.get(0),
        )?)
    }

    fn count_events_in_range(
        &self,
        event_type: EventType,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<u32, RiskError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE type = ?1 AND timestamp >= ?2 AND timestamp < ?3",
            params![event_type.as_str(), from_ms, to_ms],
            |row| row.get(0),
        )?)
    }

    fn avg_daily_event_count_for_hour(
        &self,
        event_type: EventType,
        hour: u8,
        since_ms: i64,
        until_ms: i64,
    ) -> Result<f64, RiskError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM events
             WHERE type = ?1 AND timestamp >= ?2 AND timestamp < ?3
               AND CAST(strftime('%H', (timestamp / 1000) + ?4, 'unixepoch') AS INTEGER) = ?5",
            params![event_type.as_str(), since_ms, until_ms, self.utc_offset_secs, hour],
            |row| row.get(0),
        )?;
        Ok(count as f64 / days_spanned(since_ms, until_ms) as f64)
    }

    fn last_event_at(&self, event_type: EventType) -> Result<Option<i64>, RiskError> {
        Ok(self.conn().query_row(
            "SELECT MAX(timestamp) FROM events WHERE type = ?1",
            params![event_type.as_str()],
            |row| row.get(0),
        )?)
    }

    fn session_effectiveness(&self) -> Result<Vec<SessionEffectiveness>, RiskError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT type, AVG(intensity_before - intensity_after), COUNT(*)
             FROM intervention_sessions GROUP BY type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionEffectiveness {
                intervention_type: row.get(0)?,
                mean_reduction: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn recent_check_in(&self, since_ms: i64) -> Result<Option<CheckIn>, RiskError> {
        let conn = self.conn();
        let readers: Vec<_> = CHECK_IN_FIELD_SETS
            .iter()
            .map(|(name, sql)| {
                let conn: &Connection = &conn;
                (*name, move || query_check_in(conn, sql, since_ms))
            })
            .collect();
        let attempts: Vec<ReadAttempt<'_, Option<CheckIn>>> = readers
            .iter()
            .map(|(name, read)| (*name, read as &dyn Fn() -> Result<Option<CheckIn>, RiskError>))
            .collect();
        read_layered("check-in", &attempts)
    }

    fn count_interventions_shown(&self, since_ms: i64) -> Result<u32, RiskError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM interventions WHERE shown_at >= ?1",
            params![since_ms],
            |row| row.get(0),
        )?)
    }

    fn risk_snapshots(&self, since_ms: i64) -> Result<Vec<RiskSnapshot>, RiskError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, risk FROM risk_snapshots
             WHERE timestamp >= ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![since_ms], |row| {
            Ok(RiskSnapshot {
                timestamp: row.get(0)?,
                risk: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::migrations::{apply_migration, CURRENT_SCHEMA_VERSION};
    use crate::store::{MS_PER_DAY, MS_PER_HOUR};
    use crate::types::{AlonePattern, DayPattern, RiskWindow, ScreenTimeBucket, Trigger};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    const DAY_START: i64 = 1_705_276_800_000;

    fn sample_profile() -> OnboardingProfile {
        OnboardingProfile {
            screen_time: ScreenTimeBucket::SixPlusHours,
            risk_windows: BTreeSet::from([RiskWindow::Latenight, RiskWindow::Evening]),
            triggers: BTreeSet::from([Trigger::Loneliness, Trigger::SocialMedia]),
            alone_pattern: AlonePattern::Usually,
            day_pattern: DayPattern::Weekends,
            urge_duration_minutes: 35,
        }
    }

    /// Database that stopped at schema v1 (no optional columns)
    fn legacy_store() -> SqliteStore {
        let mut conn = Connection::open_in_memory().unwrap();
        let tx = conn.transaction().unwrap();
        apply_migration(&tx, 1).unwrap();
        tx.pragma_update(None, "user_version", 1).unwrap();
        tx.commit().unwrap();
        SqliteStore::from_connection(conn, 0)
    }

    #[test]
    fn test_migrations_reach_current_version() {
        let store = SqliteStore::open_in_memory(0).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_profile_replace_round_trip() {
        let store = SqliteStore::open_in_memory(0).unwrap();
        assert!(store.latest_profile().unwrap().is_none());

        let mut first = sample_profile();
        first.screen_time = ScreenTimeBucket::UnderTwoHours;
        store.replace_profile(&first, DAY_START).unwrap();
        store.replace_profile(&sample_profile(), DAY_START + 1).unwrap();

        assert_eq!(store.latest_profile().unwrap(), Some(sample_profile()));
    }

    #[test]
    fn test_legacy_profile_falls_back_to_reduced_query() {
        let store = legacy_store();
        store
            .conn()
            .execute(
                "INSERT INTO onboarding_profile
                    (id, screen_time, risk_windows, triggers, alone_pattern, day_pattern,
                     created_at)
                 VALUES (1, '\"4-6 hours\"', '[\"morning\"]', '[]', '\"rarely\"', '\"none\"', 0)",
                [],
            )
            .unwrap();

        let profile = store.latest_profile().unwrap().unwrap();
        assert_eq!(profile.screen_time, ScreenTimeBucket::FourToSixHours);
        assert_eq!(profile.urge_duration_minutes, 20);
    }

    #[test]
    fn test_legacy_check_in_defaults_loneliness() {
        let store = legacy_store();
        store
            .conn()
            .execute(
                "INSERT INTO check_ins (timestamp, stress_level) VALUES (?1, 7)",
                params![DAY_START],
            )
            .unwrap();

        let check_in = store.recent_check_in(DAY_START).unwrap().unwrap();
        assert_eq!(check_in.stress_level, 7);
        assert_eq!(check_in.loneliness_level, 0);
    }

    #[test]
    fn test_event_queries() {
        let store = SqliteStore::open_in_memory(0).unwrap();
        for day in 0..7 {
            let ts = DAY_START + day * MS_PER_DAY + 14 * MS_PER_HOUR;
            store.append_event(&Event::new(EventType::ScreenOn, ts)).unwrap();
        }
        store
            .append_event(&Event::new(EventType::UrgeLogged, DAY_START + 500))
            .unwrap();

        let avg = store
            .avg_daily_event_count_for_hour(
                EventType::ScreenOn,
                14,
                DAY_START,
                DAY_START + 7 * MS_PER_DAY,
            )
            .unwrap();
        assert!((avg - 1.0).abs() < 1e-9);

        assert_eq!(store.count_events(EventType::ScreenOn, DAY_START).unwrap(), 7);
        assert_eq!(
            store
                .count_events_in_range(EventType::UrgeLogged, DAY_START, DAY_START + 500)
                .unwrap(),
            0
        );
        assert_eq!(
            store.last_event_at(EventType::UrgeLogged).unwrap(),
            Some(DAY_START + 500)
        );
        assert_eq!(store.last_event_at(EventType::LapseLogged).unwrap(), None);
    }

    #[test]
    fn test_session_effectiveness_groups_by_type() {
        let store = SqliteStore::open_in_memory(0).unwrap();
        for (kind, before, after) in [("breathing", 8, 4), ("breathing", 6, 4), ("walk", 9, 2)] {
            store
                .record_session(&CompletedSession {
                    intervention_type: kind.to_string(),
                    completed_at: DAY_START,
                    intensity_before: before,
                    intensity_after: after,
                })
                .unwrap();
        }

        let mut summary = store.session_effectiveness().unwrap();
        summary.sort_by(|a, b| a.intervention_type.cmp(&b.intervention_type));
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].count, 2);
        assert!((summary[0].mean_reduction - 3.0).abs() < 1e-9);
        assert!((summary[1].mean_reduction - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_interventions_snapshots_and_wipe() {
        let store = SqliteStore::open_in_memory(0).unwrap();
        store
            .log_intervention(&InterventionLogEntry {
                intervention_type: "breathing".to_string(),
                shown_at: DAY_START,
                completed_at: None,
                risk_at_show: 75,
                helped: None,
                duration_seconds: None,
            })
            .unwrap();
        store
            .record_risk_snapshot(&RiskSnapshot {
                timestamp: DAY_START + 10,
                risk: 64,
            })
            .unwrap();

        assert_eq!(store.count_interventions_shown(DAY_START).unwrap(), 1);
        assert_eq!(store.count_interventions_shown(DAY_START + 1).unwrap(), 0);
        assert_eq!(store.risk_snapshots(0).unwrap().len(), 1);

        store.wipe().unwrap();
        assert_eq!(store.count_interventions_shown(0).unwrap(), 0);
        assert!(store.risk_snapshots(0).unwrap().is_empty());
    }
}
