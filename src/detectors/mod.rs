//! Detectors (§4.5-4.8): three independent analyzers plus the shared
//! cooldown/dispatch gate. Each sweep reads one `snapshot_all()` from the
//! store and the current catalog state, computes candidate alerts, and
//! filters them through the cooldown gate before returning — the detectors
//! never talk to the notifier directly (§9: "neither holds a
//! back-reference").

pub mod basis;
pub mod cooldown;
pub mod cross_exchange;
pub mod daily_cache;
pub mod volatility;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::catalog::SymbolCatalog;
use crate::config::AppConfig;
use crate::model::{Alert, InstrumentKind, VenueId};
use crate::store::MarketStateStore;

pub use cooldown::CooldownGate;
pub use daily_cache::DailyCache;

use basis::BasisParams;
use cross_exchange::{CrossExchangeParams, VenueQuote};
use volatility::VolatilityParams;

/// Owns the two pieces of cross-sweep state (cooldown map, daily cache) and
/// exposes one sweep function per detector kind.
pub struct DetectorEngine {
    pub cooldown: CooldownGate,
    pub daily_cache: DailyCache,
}

impl Default for DetectorEngine {
    fn default() -> Self {
        Self { cooldown: CooldownGate::new(), daily_cache: DailyCache::new() }
    }
}

impl DetectorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Volatility sweep (§4.5) over every eligible (spot + perpetual)
    /// instrument on the configured venues.
    pub fn run_volatility_sweep(
        &self,
        catalog: &SymbolCatalog,
        store: &MarketStateStore,
        config: &AppConfig,
        venues: &[VenueId],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let params = VolatilityParams {
            lookback_minutes: config.lookback_minutes,
            min_price_increase_percent: config.min_price_increase_percent,
            min_price_decrease_percent: config.min_price_decrease_percent,
            detect_downside: config.detect_downside,
            volume_spike_threshold: config.volume_spike_threshold,
        };

        let mut instruments = Vec::new();
        for venue in venues {
            instruments.extend(catalog.spot_symbols(venue, None));
            instruments.extend(catalog.perpetual_symbols(venue, None));
        }

        let snapshot = store.snapshot_all(&instruments);

        let mut out = Vec::new();
        for instrument in &instruments {
            if !volatility::eligible(instrument) {
                continue;
            }
            let Some(frame) = snapshot
                .get(&instrument.venue)
                .and_then(|by_kind| by_kind.get(&instrument.kind))
                .and_then(|by_symbol| by_symbol.get(&instrument.raw_symbol))
            else {
                continue;
            };
            if frame.bars.is_empty() {
                continue;
            }

            let last_close = frame.bars.last().unwrap().close;
            let percentile =
                self.daily_cache.percentile(&instrument.venue, &instrument.raw_symbol, last_close, now);

            let Some(alert) = volatility::evaluate(instrument, &frame.bars, &params, percentile) else {
                continue;
            };
            if self.cooldown.allow(&alert.dedup_key, now, config.volatility_cooldown_seconds as i64) {
                out.push(alert);
            }
        }
        out
    }

    /// Basis sweep (§4.6): matches spot and perpetual frames by canonical
    /// base within each venue.
    pub fn run_basis_sweep(
        &self,
        catalog: &SymbolCatalog,
        store: &MarketStateStore,
        config: &AppConfig,
        venues: &[VenueId],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let params =
            BasisParams { threshold_percent: config.spot_futures_diff_threshold, direction_filter: config.spot_futures_basis_direction };

        let mut out = Vec::new();
        for venue in venues {
            let spots = catalog.spot_symbols(venue, None);
            let perps = catalog.perpetual_symbols(venue, None);

            let mut by_base: HashMap<String, (Option<&str>, Option<&str>)> = HashMap::new();
            for s in &spots {
                by_base.entry(s.canonical_base.clone()).or_default().0 = Some(&s.raw_symbol);
            }
            for p in &perps {
                by_base.entry(p.canonical_base.clone()).or_default().1 = Some(&p.raw_symbol);
            }

            let mut instruments = spots.clone();
            instruments.extend(perps.clone());
            let snapshot = store.snapshot_all(&instruments);
            let Some(venue_snapshot) = snapshot.get(venue) else { continue };

            for (spot_symbol, future_symbol) in by_base.values().filter_map(|(s, f)| Some((s.as_ref()?, f.as_ref()?))) {
                let spot_close = venue_snapshot
                    .get(&InstrumentKind::Spot)
                    .and_then(|m| m.get(*spot_symbol))
                    .and_then(|frame| frame.bars.last())
                    .map(|b| b.close);
                let future_close = venue_snapshot
                    .get(&InstrumentKind::Perpetual)
                    .and_then(|m| m.get(*future_symbol))
                    .and_then(|frame| frame.bars.last())
                    .map(|b| b.close);

                let (Some(spot_close), Some(future_close)) = (spot_close, future_close) else { continue };

                let Some(alert) = basis::evaluate(venue, spot_symbol, future_symbol, spot_close, future_close, &params)
                else {
                    continue;
                };
                if self.cooldown.allow(&alert.dedup_key, now, config.basis_cooldown_seconds as i64) {
                    out.push(alert);
                }
            }
        }
        out
    }

    /// Cross-exchange spread sweep (§4.7) over the configured perpetual
    /// venue set.
    pub fn run_cross_exchange_sweep(
        &self,
        catalog: &SymbolCatalog,
        store: &MarketStateStore,
        config: &AppConfig,
        perp_venues: &[VenueId],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        if perp_venues.len() < 2 {
            return Vec::new();
        }

        let params = CrossExchangeParams {
            threshold_percent: config.perp_diff_threshold,
            volume_thresholds: config.exchange_volume_thresholds.clone(),
        };

        let intersection = catalog.perpetual_intersection(perp_venues);
        let mut instruments = Vec::new();
        for venue in perp_venues {
            instruments.extend(catalog.perpetual_symbols(venue, None));
        }
        let snapshot = store.snapshot_all(&instruments);

        let mut out = Vec::new();
        for (base, per_venue_symbol) in &intersection {
            if config.perp_blacklist.iter().any(|b| b.eq_ignore_ascii_case(base)) {
                continue;
            }

            let mut quotes: Vec<(&VenueId, VenueQuote)> = Vec::new();
            for (venue, raw_symbol) in per_venue_symbol {
                let Some(frame) = snapshot
                    .get(venue)
                    .and_then(|by_kind| by_kind.get(&InstrumentKind::Perpetual))
                    .and_then(|by_symbol| by_symbol.get(raw_symbol))
                else {
                    continue;
                };
                let Some(last) = frame.bars.last() else { continue };
                let base_volume = frame.ticker.map(|t| t.base_volume_24h).unwrap_or(0.0);
                quotes.push((venue, VenueQuote { price: last.close, base_volume_24h: base_volume }));
            }

            for i in 0..quotes.len() {
                for j in (i + 1)..quotes.len() {
                    let (venue_a, quote_a) = quotes[i];
                    let (venue_b, quote_b) = quotes[j];
                    let Some(alert) = cross_exchange::evaluate(base, venue_a, quote_a, venue_b, quote_b, &params)
                    else {
                        continue;
                    };
                    if self.cooldown.allow(&alert.dedup_key, now, config.cross_exchange_cooldown_seconds as i64) {
                        out.push(alert);
                    }
                }
            }
        }
        out
    }

    /// Periodic maintenance (§4.4): purges cooldown and daily-cache entries
    /// past their TTL.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        let max_ttl = 3600; // the longest of the three cooldown TTLs (volatility)
        self.cooldown.purge_expired(now, max_ttl);
        self.daily_cache.purge_expired(now);
    }
}
