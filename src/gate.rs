//! Intervention auto-trigger gate
//!
//! At most one auto-prompt per rolling anti-spam window. When the
//! intervention log cannot be read the gate stays closed.

use chrono::{DateTime, FixedOffset};

use crate::config::EngineConfig;
use crate::store::{EventStore, MS_PER_MINUTE};

/// Decide from already-read values
pub fn gate_open(current_risk: u8, shown_in_window: u32, threshold: u8) -> bool {
    current_risk >= threshold && shown_in_window == 0
}

pub struct InterventionGate<'a, S: EventStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: EventStore + ?Sized> InterventionGate<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Whether an intervention may be shown automatically at `now`
    pub fn should_auto_trigger(&self, current_risk: u8, now: DateTime<FixedOffset>) -> bool {
        if current_risk < self.config.trigger_threshold {
            return false;
        }

        let since_ms =
            now.timestamp_millis() - self.config.anti_spam_window_minutes as i64 * MS_PER_MINUTE;
        match self.store.count_interventions_shown(since_ms) {
            Ok(shown) => {
                let open = gate_open(current_risk, shown, self.config.trigger_threshold);
                log::debug!("gate risk={current_risk} shown_recently={shown} open={open}");
                open
            }
            Err(err) => {
                log::warn!("intervention log unavailable, gate stays closed: {err}");
                false
            }
        }
    }
}
