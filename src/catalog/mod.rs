//! Symbol Catalog & Normalizer (§4.2).
//!
//! Loads per-venue instrument lists, classifies and canonicalizes them, and
//! answers the three queries detectors and supervisors need. The catalog
//! itself is immutable between reloads — each reload publishes a brand new
//! snapshot atomically via `ArcSwap`, the same copy-on-write technique the
//! teacher uses for its lock-free `BookStore` reads (`arc_swap::ArcSwap` is
//! already in the teacher's Cargo.toml).
//!
//! The per-venue invalid set lives alongside the catalog but outside the
//! swapped snapshot: it is populated by the stream supervisor (§4.4) and must
//! survive catalog reloads for the lifetime of the process.

pub mod blacklist;
pub mod normalize;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::adapter::ExchangeAdapter;
use crate::model::{Instrument, InstrumentKind, VenueId};

pub use blacklist::Blacklist;

/// Per-venue cap applied only by the bounded-request (polling) fallback path
/// (§4.2: "Cap per-venue result at 500 symbols when polling... No cap when
/// streaming").
pub const POLLING_SYMBOL_CAP: usize = 500;

#[derive(Debug, Default)]
struct CatalogSnapshot {
    /// venue -> raw_symbol -> Instrument
    by_venue: HashMap<VenueId, HashMap<String, Instrument>>,
}

pub struct SymbolCatalog {
    snapshot: ArcSwap<CatalogSnapshot>,
    blacklist: Blacklist,
    invalid: RwLock<HashMap<VenueId, HashSet<String>>>,
}

impl SymbolCatalog {
    pub fn new(blacklist: Blacklist) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CatalogSnapshot::default()),
            blacklist,
            invalid: RwLock::new(HashMap::new()),
        }
    }

    /// Invokes `load_markets` on the adapter and publishes a new snapshot for
    /// this venue's instruments atomically (copy-on-write: the old snapshot
    /// stays valid for any reader holding it).
    pub async fn load_venue(
        &self,
        venue: &VenueId,
        adapter: &dyn ExchangeAdapter,
    ) -> anyhow::Result<usize> {
        let markets = adapter.load_markets().await?;
        let mut instruments = HashMap::with_capacity(markets.len());

        for (raw_symbol, meta) in markets {
            if !meta.active {
                continue;
            }
            let canonical_base = normalize::canonicalize(&raw_symbol);
            let kind = normalize::classify(&raw_symbol, &meta);
            instruments.insert(
                raw_symbol.clone(),
                Instrument {
                    venue: venue.clone(),
                    raw_symbol,
                    canonical_base,
                    kind,
                    meta,
                },
            );
        }

        let count = instruments.len();
        let current = self.snapshot.load();
        let mut by_venue = current.by_venue.clone();
        by_venue.insert(venue.clone(), instruments);
        self.snapshot.store(Arc::new(CatalogSnapshot { by_venue }));

        Ok(count)
    }

    pub fn mark_invalid(&self, venue: &VenueId, raw_symbol: &str) {
        self.invalid
            .write()
            .entry(venue.clone())
            .or_default()
            .insert(raw_symbol.to_string());
    }

    pub fn is_invalid(&self, venue: &VenueId, raw_symbol: &str) -> bool {
        self.invalid
            .read()
            .get(venue)
            .is_some_and(|set| set.contains(raw_symbol))
    }

    fn eligible(&self, instrument: &Instrument) -> bool {
        !self.blacklist.contains(&instrument.canonical_base)
            && !self.is_invalid(&instrument.venue, &instrument.raw_symbol)
    }

    fn symbols_of_kind(
        &self,
        venue: &VenueId,
        kind: InstrumentKind,
        cap: Option<usize>,
    ) -> Vec<Instrument> {
        let snapshot = self.snapshot.load();
        let Some(venue_map) = snapshot.by_venue.get(venue) else {
            return Vec::new();
        };

        let mut out: Vec<Instrument> = venue_map
            .values()
            .filter(|i| i.kind == kind && self.eligible(i))
            .cloned()
            .collect();

        out.sort_by(|a, b| a.raw_symbol.cmp(&b.raw_symbol));
        if let Some(cap) = cap {
            out.truncate(cap);
        }
        out
    }

    /// `spot_symbols(venue)` query (§4.2).
    pub fn spot_symbols(&self, venue: &VenueId, cap: Option<usize>) -> Vec<Instrument> {
        self.symbols_of_kind(venue, InstrumentKind::Spot, cap)
    }

    /// `perpetual_symbols(venue)` query (§4.2).
    pub fn perpetual_symbols(&self, venue: &VenueId, cap: Option<usize>) -> Vec<Instrument> {
        self.symbols_of_kind(venue, InstrumentKind::Perpetual, cap)
    }

    /// `perpetual_intersection(venues)` query: canonical_base -> per-venue
    /// raw_symbol, restricted to bases present (as a perpetual) on every
    /// given venue (§3, §4.7).
    pub fn perpetual_intersection(
        &self,
        venues: &[VenueId],
    ) -> HashMap<String, HashMap<VenueId, String>> {
        let mut per_venue_bases: Vec<HashMap<String, String>> = Vec::with_capacity(venues.len());

        for venue in venues {
            let mut bases = HashMap::new();
            for instrument in self.perpetual_symbols(venue, None) {
                bases.insert(instrument.canonical_base, instrument.raw_symbol);
            }
            per_venue_bases.push(bases);
        }

        let Some(first) = per_venue_bases.first() else {
            return HashMap::new();
        };

        let mut common: HashSet<String> = first.keys().cloned().collect();
        for bases in &per_venue_bases[1..] {
            common.retain(|base| bases.contains_key(base));
        }

        let mut result = HashMap::with_capacity(common.len());
        for base in common {
            let mut per_venue = HashMap::with_capacity(venues.len());
            for (venue, bases) in venues.iter().zip(per_venue_bases.iter()) {
                if let Some(raw_symbol) = bases.get(&base) {
                    per_venue.insert(venue.clone(), raw_symbol.clone());
                }
            }
            result.insert(base, per_venue);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarketMeta;
    use std::collections::HashMap as Map;

    fn meta(is_swap: bool) -> MarketMeta {
        MarketMeta {
            active: true,
            base: "X".to_string(),
            quote: "USDT".to_string(),
            is_swap,
            is_future: false,
        }
    }

    fn instrument(venue: &str, raw: &str, base: &str, kind: InstrumentKind) -> Instrument {
        Instrument {
            venue: VenueId::from(venue),
            raw_symbol: raw.to_string(),
            canonical_base: base.to_string(),
            kind,
            meta: meta(kind == InstrumentKind::Perpetual),
        }
    }

    fn catalog_with(venues: Map<&str, Vec<Instrument>>) -> SymbolCatalog {
        let catalog = SymbolCatalog::new(Blacklist::default());
        let mut by_venue = Map::new();
        for (venue, instruments) in venues {
            let mut raw_map = Map::new();
            for i in instruments {
                raw_map.insert(i.raw_symbol.clone(), i);
            }
            by_venue.insert(VenueId::from(venue), raw_map);
        }
        catalog
            .snapshot
            .store(Arc::new(CatalogSnapshot { by_venue }));
        catalog
    }

    #[test]
    fn perpetual_intersection_requires_presence_on_every_venue() {
        let catalog = catalog_with(Map::from([
            (
                "binance",
                vec![
                    instrument("binance", "BTC/USDT:USDT", "BTC", InstrumentKind::Perpetual),
                    instrument("binance", "ETH/USDT:USDT", "ETH", InstrumentKind::Perpetual),
                ],
            ),
            (
                "gate",
                vec![instrument("gate", "BTC_USDT", "BTC", InstrumentKind::Perpetual)],
            ),
        ]));

        let intersection =
            catalog.perpetual_intersection(&[VenueId::from("binance"), VenueId::from("gate")]);

        assert_eq!(intersection.len(), 1);
        assert!(intersection.contains_key("BTC"));
        assert!(!intersection.contains_key("ETH"));
    }

    #[test]
    fn empty_venue_intersection_is_empty_not_error() {
        let catalog = SymbolCatalog::new(Blacklist::default());
        let intersection = catalog.perpetual_intersection(&[]);
        assert!(intersection.is_empty());
    }

    #[test]
    fn invalid_symbols_are_excluded_from_queries() {
        let catalog = catalog_with(Map::from([(
            "binance",
            vec![instrument("binance", "LINA/USDT:USDT", "LINA", InstrumentKind::Perpetual)],
        )]));
        catalog.mark_invalid(&VenueId::from("binance"), "LINA/USDT:USDT");

        let symbols = catalog.perpetual_symbols(&VenueId::from("binance"), None);
        assert!(symbols.is_empty());
    }

    #[test]
    fn blacklisted_base_is_excluded() {
        let catalog = SymbolCatalog::new(Blacklist::new(["LINA".to_string()]));
        catalog.snapshot.store(Arc::new(CatalogSnapshot {
            by_venue: Map::from([(
                VenueId::from("gate"),
                Map::from([(
                    "LINA/USDT:USDT".to_string(),
                    instrument("gate", "LINA/USDT:USDT", "LINA", InstrumentKind::Perpetual),
                )]),
            )]),
        }));

        assert!(catalog.perpetual_symbols(&VenueId::from("gate"), None).is_empty());
    }

    #[test]
    fn polling_cap_truncates_results() {
        let instruments: Vec<Instrument> = (0..POLLING_SYMBOL_CAP + 50)
            .map(|i| {
                instrument(
                    "binance",
                    &format!("SYM{i}/USDT"),
                    &format!("SYM{i}"),
                    InstrumentKind::Spot,
                )
            })
            .collect();
        let catalog = catalog_with(Map::from([("binance", instruments)]));

        let capped = catalog.spot_symbols(&VenueId::from("binance"), Some(POLLING_SYMBOL_CAP));
        assert_eq!(capped.len(), POLLING_SYMBOL_CAP);

        let uncapped = catalog.spot_symbols(&VenueId::from("binance"), None);
        assert_eq!(uncapped.len(), POLLING_SYMBOL_CAP + 50);
    }
}
