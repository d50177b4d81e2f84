//! Single-slot time-bounded cache
//!
//! Holds at most one value, keyed by a hash of its inputs. Owned by the
//! engine instance rather than shared process-wide, so tests can reset it.

use chrono::{DateTime, Duration, FixedOffset};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    key: u64,
    expires_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct CacheSlot<T> {
    entry: Option<CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> CacheSlot<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// Cached value if `key` matches and the entry has not expired
    pub fn get(&self, key: u64, now: DateTime<FixedOffset>) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|entry| entry.key == key && now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    /// Replace the slot contents
    pub fn put(&mut self, key: u64, value: T, now: DateTime<FixedOffset>) {
        self.entry = Some(CacheEntry {
            value,
            key,
            expires_at: now + self.ttl,
        });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, 12, minute, second)
            .unwrap()
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut slot = CacheSlot::new(Duration::seconds(300));
        slot.put(7, "a", at(0, 0));

        assert_eq!(slot.get(7, at(4, 59)), Some("a"));
        assert_eq!(slot.get(7, at(5, 0)), None);
    }

    #[test]
    fn test_key_mismatch_misses() {
        let mut slot = CacheSlot::new(Duration::seconds(300));
        slot.put(7, "a", at(0, 0));
        assert_eq!(slot.get(8, at(0, 1)), None);
    }

    #[test]
    fn test_put_replaces_and_invalidate_clears() {
        let mut slot = CacheSlot::new(Duration::seconds(300));
        slot.put(1, "a", at(0, 0));
        slot.put(2, "b", at(1, 0));
        assert_eq!(slot.get(1, at(1, 0)), None);
        assert_eq!(slot.get(2, at(1, 0)), Some("b"));

        slot.invalidate();
        assert!(slot.is_empty());
        assert_eq!(slot.get(2, at(1, 0)), None);
    }
}
