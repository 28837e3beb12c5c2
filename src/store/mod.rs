//! Market State Store (§4.3): the single in-memory source of truth for
//! recent bars and the latest ticker per (venue, raw_symbol).
//!
//! Grounded on the teacher's `BookStore` (`src/scrapers/polymarket_book_store.rs`):
//! a coarse `RwLock` guards only the *structure* (which keys exist), while
//! each key's own state carries its own fine-grained lock. That keeps a
//! write on one symbol from blocking a read on another, and keeps detector
//! computation — which can run for a while over hundreds of symbols — off
//! the coarse lock entirely.

pub mod window;

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::model::{Bar, Instrument, InstrumentKind, Ticker, VenueId};

pub use window::{RecordOutcome, RollingWindow, SymbolState};

const SHARD_COUNT: usize = 16;

/// §4.3: "latest timestamp older than 5 minutes -> warn but still return".
const STALENESS_WARN_SECS: i64 = 5 * 60;
/// §4.3 timezone-artifact exception: a frame whose last bar is ~8h stale is
/// almost always a daylight-saving/UTC-offset quirk in the adapter's
/// timestamps, not real staleness, and shouldn't trip the warning.
const TIMEZONE_ARTIFACT_SECS_LOW: i64 = 8 * 60 * 60 - 120;
const TIMEZONE_ARTIFACT_SECS_HIGH: i64 = 8 * 60 * 60 + 120;

type Key = (VenueId, String);

/// A consistent read of one symbol's state: ascending bars plus the latest
/// ticker, if any has arrived.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bars: Vec<Bar>,
    pub ticker: Option<Ticker>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty() && self.ticker.is_none()
    }
}

/// Sharded map of per-symbol state. Each shard is its own `RwLock`, so
/// structural changes (first bar for a brand-new symbol) on shard A never
/// contend with a read or write on shard B.
pub struct MarketStateStore {
    shards: Vec<RwLock<HashMap<Key, Arc<Mutex<SymbolState>>>>>,
    capacity_per_symbol: usize,
}

impl MarketStateStore {
    pub fn new(capacity_per_symbol: usize) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, capacity_per_symbol }
    }

    fn shard_index(key: &Key) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }

    /// Returns the `Arc<Mutex<SymbolState>>` for this key, inserting a fresh
    /// one under a write lock only the first time it's seen.
    fn cell(&self, venue: &VenueId, raw_symbol: &str) -> Arc<Mutex<SymbolState>> {
        let key = (venue.clone(), raw_symbol.to_string());
        let idx = Self::shard_index(&key);

        if let Some(existing) = self.shards[idx].read().get(&key) {
            return existing.clone();
        }

        let mut shard = self.shards[idx].write();
        shard
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(SymbolState::new(self.capacity_per_symbol))))
            .clone()
    }

    /// `record_bar` (§4.3).
    pub fn record_bar(&self, venue: &VenueId, raw_symbol: &str, bar: Bar) -> RecordOutcome {
        let cell = self.cell(venue, raw_symbol);
        let mut state = cell.lock();
        let outcome = state.window.record(bar);
        if outcome == RecordOutcome::Rejected {
            let app_err = AppError::StoreIntegrity {
                venue: venue.to_string(),
                symbol: raw_symbol.to_string(),
                reason: "bar failed window validation".to_string(),
            };
            warn!(venue = %venue, symbol = raw_symbol, error = %app_err, "bar rejected");
        }
        outcome
    }

    /// `record_ticker` (§4.3): merged into the same per-key lock as bars.
    pub fn record_ticker(&self, venue: &VenueId, raw_symbol: &str, ticker: Ticker) {
        if !ticker.is_valid() {
            let app_err = AppError::StoreIntegrity {
                venue: venue.to_string(),
                symbol: raw_symbol.to_string(),
                reason: "ticker failed validity check".to_string(),
            };
            warn!(venue = %venue, symbol = raw_symbol, error = %app_err, "ticker rejected");
            return;
        }
        let cell = self.cell(venue, raw_symbol);
        let mut state = cell.lock();
        state.ticker = Some(ticker);
    }

    /// `snapshot(venue, symbol)` (§4.3): a consistent point-in-time copy.
    /// Returns `None` for a key never written to.
    pub fn snapshot(&self, venue: &VenueId, raw_symbol: &str) -> Option<Frame> {
        let key = (venue.clone(), raw_symbol.to_string());
        let idx = Self::shard_index(&key);
        let cell = self.shards[idx].read().get(&key)?.clone();
        let state = cell.lock();
        Some(Frame { bars: state.window.bars(), ticker: state.ticker.clone() })
    }

    /// `snapshot_all()` (§4.3): groups every symbol's frame by venue and
    /// market classification, as told by the catalog's `instruments` list.
    /// Empty frames (no bar and no ticker recorded yet) are skipped rather
    /// than surfaced to detectors as zero-length windows.
    ///
    /// Takes a read lock per shard only long enough to clone the `Arc`
    /// handles it needs, then releases it before copying any symbol's data —
    /// detector computation never runs while holding a shard lock.
    pub fn snapshot_all(
        &self,
        instruments: &[Instrument],
    ) -> HashMap<VenueId, HashMap<InstrumentKind, HashMap<String, Frame>>> {
        let mut out: HashMap<VenueId, HashMap<InstrumentKind, HashMap<String, Frame>>> =
            HashMap::new();

        for instrument in instruments {
            let key = (instrument.venue.clone(), instrument.raw_symbol.clone());
            let idx = Self::shard_index(&key);
            let cell = { self.shards[idx].read().get(&key).cloned() };
            let Some(cell) = cell else { continue };

            let frame = {
                let state = cell.lock();
                Frame { bars: state.window.bars(), ticker: state.ticker.clone() }
            };
            if frame.is_empty() {
                continue;
            }

            if let Some(latest_ms) = Self::latest_ts_ms(&frame) {
                let age_secs = (Utc::now().timestamp_millis() - latest_ms) / 1000;
                let is_timezone_artifact =
                    (TIMEZONE_ARTIFACT_SECS_LOW..=TIMEZONE_ARTIFACT_SECS_HIGH).contains(&age_secs);
                if age_secs >= STALENESS_WARN_SECS && !is_timezone_artifact {
                    let app_err = AppError::SnapshotIntegrity {
                        venue: instrument.venue.to_string(),
                        symbol: instrument.raw_symbol.clone(),
                        reason: format!("latest timestamp is {age_secs}s old"),
                    };
                    debug!(venue = %instrument.venue, symbol = %instrument.raw_symbol, error = %app_err, "stale snapshot");
                }
            }

            out.entry(instrument.venue.clone())
                .or_default()
                .entry(instrument.kind)
                .or_default()
                .insert(instrument.raw_symbol.clone(), frame);
        }

        out
    }

    /// Latest known timestamp in a frame, taken from whichever of the last
    /// bar or the ticker is newer.
    fn latest_ts_ms(frame: &Frame) -> Option<i64> {
        let bar_ts = frame.bars.last().map(|b| b.ts_ms);
        let ticker_ts = frame.ticker.as_ref().map(|t| t.ts_ms);
        bar_ts.into_iter().chain(ticker_ts).max()
    }

    /// Drops state for symbols no longer present in the catalog (used after
    /// a stream is permanently evicted — §4.4). Cheap to skip: stale entries
    /// just sit unread until process restart, but explicit cleanup keeps
    /// long-running memory flat.
    pub fn remove(&self, venue: &VenueId, raw_symbol: &str) {
        let key = (venue.clone(), raw_symbol.to_string());
        let idx = Self::shard_index(&key);
        self.shards[idx].write().remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarketMeta;

    fn bar(ts_ms: i64, close: f64) -> Bar {
        Bar { ts_ms, open: close, high: close, low: close, close, volume: 10.0 }
    }

    fn ticker(ts_ms: i64) -> Ticker {
        Ticker { bid: 1.0, ask: 1.1, last: 1.05, base_volume_24h: 100.0, quote_volume_24h: 100.0, ts_ms }
    }

    #[test]
    fn snapshot_of_unknown_key_is_none() {
        let store = MarketStateStore::new(1000);
        assert!(store.snapshot(&VenueId::from("binance"), "BTC/USDT").is_none());
    }

    #[test]
    fn record_then_snapshot_round_trips() {
        let store = MarketStateStore::new(1000);
        let venue = VenueId::from("binance");
        store.record_bar(&venue, "BTC/USDT", bar(1, 100.0));
        store.record_bar(&venue, "BTC/USDT", bar(2, 101.0));
        store.record_ticker(&venue, "BTC/USDT", ticker(2));

        let frame = store.snapshot(&venue, "BTC/USDT").unwrap();
        assert_eq!(frame.bars.len(), 2);
        assert_eq!(frame.ticker.unwrap().last, 1.05);
    }

    #[test]
    fn invalid_ticker_is_not_recorded() {
        let store = MarketStateStore::new(1000);
        let venue = VenueId::from("binance");
        let mut bad = ticker(1);
        bad.last = f64::NAN;
        store.record_ticker(&venue, "BTC/USDT", bad);
        // Never wrote a bar either, so the key never got created.
        assert!(store.snapshot(&venue, "BTC/USDT").is_none());
    }

    #[test]
    fn snapshot_all_groups_by_venue_and_kind_and_skips_empty() {
        let store = MarketStateStore::new(1000);
        let binance = VenueId::from("binance");
        let gate = VenueId::from("gate");

        store.record_bar(&binance, "BTC/USDT", bar(1, 100.0));
        store.record_bar(&binance, "BTC/USDT:USDT", bar(1, 100.0));
        // gate's ETH perpetual never gets a bar recorded -> must be skipped.

        let meta = MarketMeta { active: true, base: "BTC".into(), quote: "USDT".into(), is_swap: false, is_future: false };
        let instruments = vec![
            Instrument {
                venue: binance.clone(),
                raw_symbol: "BTC/USDT".into(),
                canonical_base: "BTC".into(),
                kind: InstrumentKind::Spot,
                meta: meta.clone(),
            },
            Instrument {
                venue: binance.clone(),
                raw_symbol: "BTC/USDT:USDT".into(),
                canonical_base: "BTC".into(),
                kind: InstrumentKind::Perpetual,
                meta: meta.clone(),
            },
            Instrument {
                venue: gate.clone(),
                raw_symbol: "ETH/USDT:USDT".into(),
                canonical_base: "ETH".into(),
                kind: InstrumentKind::Perpetual,
                meta,
            },
        ];

        let snap = store.snapshot_all(&instruments);
        assert_eq!(snap.len(), 1);
        let binance_snap = &snap[&binance];
        assert_eq!(binance_snap.len(), 2);
        assert!(binance_snap[&InstrumentKind::Spot].contains_key("BTC/USDT"));
        assert!(binance_snap[&InstrumentKind::Perpetual].contains_key("BTC/USDT:USDT"));
        assert!(!snap.contains_key(&gate));
    }

    #[test]
    fn remove_drops_symbol_state() {
        let store = MarketStateStore::new(1000);
        let venue = VenueId::from("binance");
        store.record_bar(&venue, "BTC/USDT", bar(1, 100.0));
        store.remove(&venue, "BTC/USDT");
        assert!(store.snapshot(&venue, "BTC/USDT").is_none());
    }
}
