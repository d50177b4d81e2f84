//! In-memory event store
//!
//! Backs tests, the FFI surface and the CLI `--log` input. The whole store can
//! be loaded from and saved to a single JSON [`EventLog`] document.

use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RiskError;
use crate::recommend::group_sessions;
use crate::store::{check_utc_offset, days_spanned, local_hour, EventStore};
use crate::types::{
    CheckIn, CompletedSession, Event, EventType, InterventionLogEntry, OnboardingProfile,
    RiskSnapshot, SessionEffectiveness,
};

/// Serializable contents of a device's local log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLog {
    pub profile: Option<OnboardingProfile>,
    pub events: Vec<Event>,
    pub interventions: Vec<InterventionLogEntry>,
    pub sessions: Vec<CompletedSession>,
    pub check_ins: Vec<CheckIn>,
    pub snapshots: Vec<RiskSnapshot>,
    /// Offset used to bucket events by local hour
    pub utc_offset_minutes: i32,
}

impl EventLog {
    /// Parse a log document, rejecting offsets no device clock reports
    pub fn from_json(json: &str) -> Result<Self, RiskError> {
        let log: Self = serde_json::from_str(json)?;
        check_utc_offset(log.utc_offset_minutes)?;
        Ok(log)
    }

    pub fn to_json(&self) -> Result<String, RiskError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Event store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    log: RwLock<EventLog>,
}

impl MemoryStore {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self::from_log(EventLog {
            utc_offset_minutes,
            ..EventLog::default()
        })
    }

    pub fn from_log(log: EventLog) -> Self {
        Self {
            log: RwLock::new(log),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, RiskError> {
        Ok(Self::from_log(EventLog::from_json(json)?))
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> EventLog {
        self.read().clone()
    }

    pub fn to_json(&self) -> Result<String, RiskError> {
        self.read().to_json()
    }

    /// Replace the onboarding snapshot; the previous one is discarded
    pub fn replace_profile(&self, profile: OnboardingProfile) {
        self.write().profile = Some(profile);
    }

    pub fn append_event(&self, event: Event) {
        self.write().events.push(event);
    }

    pub fn log_intervention(&self, entry: InterventionLogEntry) {
        self.write().interventions.push(entry);
    }

    pub fn record_session(&self, session: CompletedSession) {
        self.write().sessions.push(session);
    }

    pub fn record_check_in(&self, check_in: CheckIn) {
        self.write().check_ins.push(check_in);
    }

    pub fn record_risk_snapshot(&self, snapshot: RiskSnapshot) {
        self.write().snapshots.push(snapshot);
    }

    /// Explicit full data wipe; keeps the configured offset
    pub fn wipe(&self) {
        let mut log = self.write();
        let utc_offset_minutes = log.utc_offset_minutes;
        *log = EventLog {
            utc_offset_minutes,
            ..EventLog::default()
        };
    }

    fn read(&self) -> RwLockReadGuard<'_, EventLog> {
        match self.log.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, EventLog> {
        match self.log.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn count_where(&self, event_type: EventType, matches: impl Fn(i64) -> bool) -> u32 {
        self.read()
            .events
            .iter()
            .filter(|e| e.event_type == event_type && matches(e.timestamp))
            .count() as u32
    }
}

impl EventStore for MemoryStore {
    fn utc_offset_minutes(&self) -> i32 {
        self.read().utc_offset_minutes
    }

    fn latest_profile(&self) -> Result<Option<OnboardingProfile>, RiskError> {
        Ok(self.read().profile.clone())
    }

    fn count_events(&self, event_type: EventType, since_ms: i64) -> Result<u32, RiskError> {
        Ok(self.count_where(event_type, |ts| ts >= since_ms))
    }

    fn count_events_in_range(
        &self,
        event_type: EventType,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<u32, RiskError> {
        Ok(self.count_where(event_type, |ts| ts >= from_ms && ts < to_ms))
    }

    fn avg_daily_event_count_for_hour(
        &self,
        event_type: EventType,
        hour: u8,
        since_ms: i64,
        until_ms: i64,
    ) -> Result<f64, RiskError> {
        let offset_secs = self.read().utc_offset_minutes.saturating_mul(60);
        let count = self.count_where(event_type, |ts| {
            ts >= since_ms && ts < until_ms && local_hour(ts, offset_secs) == hour
        });
        Ok(count as f64 / days_spanned(since_ms, until_ms) as f64)
    }

    fn last_event_at(&self, event_type: EventType) -> Result<Option<i64>, RiskError> {
        Ok(self
            .read()
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .map(|e| e.timestamp)
            .max())
    }

    fn session_effectiveness(&self) -> Result<Vec<SessionEffectiveness>, RiskError> {
        Ok(group_sessions(&self.read().sessions))
    }

    fn recent_check_in(&self, since_ms: i64) -> Result<Option<CheckIn>, RiskError> {
        Ok(self
            .read()
            .check_ins
            .iter()
            .filter(|c| c.timestamp >= since_ms)
            .max_by_key(|c| c.timestamp)
            .copied())
    }

    fn count_interventions_shown(&self, since_ms: i64) -> Result<u32, RiskError> {
        Ok(self
            .read()
            .interventions
            .iter()
            .filter(|i| i.shown_at >= since_ms)
            .count() as u32)
    }

    fn risk_snapshots(&self, since_ms: i64) -> Result<Vec<RiskSnapshot>, RiskError> {
        let mut snapshots: Vec<RiskSnapshot> = self
            .read()
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= since_ms)
            .copied()
            .collect();
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }
}
