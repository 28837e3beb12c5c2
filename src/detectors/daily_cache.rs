//! Daily-bar cache for the volatility detector's advisory 30-day percentile
//! (§3, §4.5, §9 Open Question 4). Never gates emission — only annotates it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::{Bar, VenueId};

const MAX_DAYS: usize = 30;
const TTL_HOURS: i64 = 6;

struct CacheEntry {
    bars: Vec<Bar>,
    fetched_at: DateTime<Utc>,
}

/// (venue, symbol) -> up to 30 daily bars, each entry expiring 6h after
/// fetch (§3: "Daily-bar Cache ... with a 6-hour expiry").
#[derive(Default)]
pub struct DailyCache {
    entries: Mutex<HashMap<(VenueId, String), CacheEntry>>,
}

#[derive(Debug, Clone, Copy)]
pub struct PercentileInfo {
    pub price_percentile: f64,
    pub thirty_day_high: f64,
    pub thirty_day_low: f64,
    pub thirty_day_avg: f64,
}

impl DailyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key has no coverage at all, or its coverage has passed the
    /// 6h TTL — the signal the daily-history fetch pass (coordinator.rs)
    /// uses to decide what's worth re-fetching.
    pub fn needs_refresh(&self, venue: &VenueId, symbol: &str, now: DateTime<Utc>) -> bool {
        let entries = self.entries.lock();
        match entries.get(&(venue.clone(), symbol.to_string())) {
            Some(entry) => (now - entry.fetched_at).num_hours() >= TTL_HOURS,
            None => true,
        }
    }

    /// Replaces the cached daily bars for a key, trimmed to the most recent
    /// `MAX_DAYS`.
    pub fn put(&self, venue: &VenueId, symbol: &str, mut bars: Vec<Bar>, now: DateTime<Utc>) {
        bars.sort_by_key(|b| b.ts_ms);
        if bars.len() > MAX_DAYS {
            let drop = bars.len() - MAX_DAYS;
            bars.drain(0..drop);
        }
        self.entries
            .lock()
            .insert((venue.clone(), symbol.to_string()), CacheEntry { bars, fetched_at: now });
    }

    /// `None` when there is no unexpired coverage — callers must treat that
    /// as "skip the annotation", never as a detector failure (§4.5: "failure
    /// to fetch daily bars never blocks the alert").
    pub fn percentile(
        &self,
        venue: &VenueId,
        symbol: &str,
        last_close: f64,
        now: DateTime<Utc>,
    ) -> Option<PercentileInfo> {
        let entries = self.entries.lock();
        let entry = entries.get(&(venue.clone(), symbol.to_string()))?;
        if (now - entry.fetched_at).num_hours() >= TTL_HOURS {
            return None;
        }
        if entry.bars.is_empty() {
            return None;
        }

        let closes: Vec<f64> = entry.bars.iter().map(|b| b.close).collect();
        let below = closes.iter().filter(|&&c| c < last_close).count();
        let price_percentile = (below as f64 / closes.len() as f64) * 100.0;
        let thirty_day_high = closes.iter().cloned().fold(f64::MIN, f64::max);
        let thirty_day_low = closes.iter().cloned().fold(f64::MAX, f64::min);
        let thirty_day_avg = closes.iter().sum::<f64>() / closes.len() as f64;

        Some(PercentileInfo { price_percentile, thirty_day_high, thirty_day_low, thirty_day_avg })
    }

    /// Periodic maintenance (§4.4): drops entries past their TTL outright,
    /// not just on next lookup, to keep the map from growing unbounded.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.lock().retain(|_, entry| (now - entry.fetched_at).num_hours() < TTL_HOURS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts_ms: i64, close: f64) -> Bar {
        Bar { ts_ms, open: close, high: close, low: close, close, volume: 1.0 }
    }

    #[test]
    fn needs_refresh_when_absent_or_expired() {
        let cache = DailyCache::new();
        let now = Utc::now();
        assert!(cache.needs_refresh(&VenueId::from("binance"), "BTC/USDT", now));

        cache.put(&VenueId::from("binance"), "BTC/USDT", vec![bar(0, 100.0)], now);
        assert!(!cache.needs_refresh(&VenueId::from("binance"), "BTC/USDT", now));

        let later = now + chrono::Duration::hours(7);
        assert!(cache.needs_refresh(&VenueId::from("binance"), "BTC/USDT", later));
    }

    #[test]
    fn no_entry_yields_none() {
        let cache = DailyCache::new();
        assert!(cache.percentile(&VenueId::from("binance"), "BTC/USDT", 100.0, Utc::now()).is_none());
    }

    #[test]
    fn percentile_counts_days_strictly_below_last_close() {
        let cache = DailyCache::new();
        let now = Utc::now();
        let bars: Vec<Bar> = (0..10).map(|i| bar(i, 90.0 + i as f64)).collect();
        cache.put(&VenueId::from("binance"), "BTC/USDT", bars, now);

        let info = cache.percentile(&VenueId::from("binance"), "BTC/USDT", 95.0, now).unwrap();
        // closes are 90..99; 5 of them (90..94) are strictly below 95.
        assert_eq!(info.price_percentile, 50.0);
        assert_eq!(info.thirty_day_high, 99.0);
        assert_eq!(info.thirty_day_low, 90.0);
    }

    #[test]
    fn expired_entry_yields_none() {
        let cache = DailyCache::new();
        let now = Utc::now();
        cache.put(&VenueId::from("binance"), "BTC/USDT", vec![bar(0, 100.0)], now);
        let later = now + chrono::Duration::hours(7);
        assert!(cache.percentile(&VenueId::from("binance"), "BTC/USDT", 100.0, later).is_none());
    }

    #[test]
    fn put_trims_to_max_days() {
        let cache = DailyCache::new();
        let now = Utc::now();
        let bars: Vec<Bar> = (0..40).map(|i| bar(i, i as f64 + 1.0)).collect();
        cache.put(&VenueId::from("binance"), "BTC/USDT", bars, now);
        let info = cache.percentile(&VenueId::from("binance"), "BTC/USDT", 1000.0, now).unwrap();
        // Only the most recent 30 (closes 11..40) survive; percentile is 100%
        // since last_close exceeds all of them, and the low must be 11.0.
        assert_eq!(info.price_percentile, 100.0);
        assert_eq!(info.thirty_day_low, 11.0);
    }
}
