//! Cooldown & Dispatch Gate (§4.8): the single chokepoint every detector
//! funnels alerts through before they reach the notifier.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Maps a dedup key to the wall-clock time of its last emission. One `now`
/// is read per batch by the caller and passed in, so every alert in the
/// same sweep is judged against the same instant (§4.8: "reads `now` once
/// per batch").
pub struct CooldownGate {
    last_emit: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownGate {
    pub fn new() -> Self {
        Self { last_emit: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` (and records `now`) if `dedup_key` may fire: either
    /// never seen, or its last emission is older than `ttl_secs`.
    pub fn allow(&self, dedup_key: &str, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        let mut map = self.last_emit.lock();
        let allowed = match map.get(dedup_key) {
            Some(last) => (now - *last).num_seconds() > ttl_secs,
            None => true,
        };
        if allowed {
            map.insert(dedup_key.to_string(), now);
        }
        allowed
    }

    /// Periodic maintenance (§4.4: "purges cooldown ... entries older than
    /// their TTL"). `max_ttl_secs` should be the largest TTL in use across
    /// alert kinds, so nothing is purged while it could still gate a repeat.
    pub fn purge_expired(&self, now: DateTime<Utc>, max_ttl_secs: i64) {
        let mut map = self.last_emit.lock();
        map.retain(|_, last| (now - *last).num_seconds() <= max_ttl_secs);
    }

    pub fn len(&self) -> usize {
        self.last_emit.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn first_alert_for_a_key_is_always_allowed() {
        let gate = CooldownGate::new();
        assert!(gate.allow("k1", Utc::now(), 300));
    }

    #[test]
    fn repeat_within_ttl_is_suppressed() {
        let gate = CooldownGate::new();
        let t0 = Utc::now();
        assert!(gate.allow("k1", t0, 300));
        assert!(!gate.allow("k1", t0 + Duration::seconds(100), 300));
    }

    #[test]
    fn repeat_after_ttl_is_allowed_again() {
        let gate = CooldownGate::new();
        let t0 = Utc::now();
        assert!(gate.allow("k1", t0, 300));
        assert!(gate.allow("k1", t0 + Duration::seconds(301), 300));
    }

    #[test]
    fn purge_drops_only_entries_past_max_ttl() {
        let gate = CooldownGate::new();
        let t0 = Utc::now();
        gate.allow("stale", t0, 300);
        gate.allow("fresh", t0 + Duration::seconds(200), 300);
        gate.purge_expired(t0 + Duration::seconds(250), 300);
        assert_eq!(gate.len(), 1);
    }
}
