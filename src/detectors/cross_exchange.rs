//! Cross-Exchange Perpetual Spread Detector (§4.7).

use std::collections::HashMap;

use crate::model::{Alert, CrossExchangePayload, VenueId};

#[derive(Debug, Clone)]
pub struct CrossExchangeParams {
    pub threshold_percent: f64,
    pub volume_thresholds: HashMap<String, f64>,
}

impl CrossExchangeParams {
    fn volume_floor(&self, venue: &VenueId) -> f64 {
        self.volume_thresholds.get(&venue.0).copied().unwrap_or(0.0)
    }
}

/// One venue's latest quote for a canonical base's perpetual, as read from
/// the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct VenueQuote {
    pub price: f64,
    pub base_volume_24h: f64,
}

/// Evaluates one unordered venue pair for one canonical base (§4.7). Per-
/// venue 24h volume floors are applied before the spread check; either side
/// failing its floor skips the pair entirely (§8 S3).
pub fn evaluate(
    canonical_base: &str,
    venue_a: &VenueId,
    quote_a: VenueQuote,
    venue_b: &VenueId,
    quote_b: VenueQuote,
    params: &CrossExchangeParams,
) -> Option<Alert> {
    if quote_a.base_volume_24h < params.volume_floor(venue_a) {
        return None;
    }
    if quote_b.base_volume_24h < params.volume_floor(venue_b) {
        return None;
    }
    if quote_a.price <= 0.0 {
        return None;
    }

    // Tie-break: equal prices to floating precision never emit (§4.7).
    if (quote_a.price - quote_b.price).abs() < f64::EPSILON {
        return None;
    }

    let spread_pct = (quote_b.price - quote_a.price) / quote_a.price * 100.0;
    if spread_pct.abs() < params.threshold_percent {
        return None;
    }

    let (higher_venue, higher_price, lower_venue, lower_price) = if quote_b.price > quote_a.price {
        (venue_b, quote_b.price, venue_a, quote_a.price)
    } else {
        (venue_a, quote_a.price, venue_b, quote_b.price)
    };

    let mut pair = [venue_a.0.as_str(), venue_b.0.as_str()];
    pair.sort_unstable();
    let dedup_key = format!("cross_exchange:{}:{}:{}", pair[0], pair[1], canonical_base);

    let payload = CrossExchangePayload {
        canonical_base: canonical_base.to_string(),
        higher_venue: higher_venue.to_string(),
        lower_venue: lower_venue.to_string(),
        higher_price,
        lower_price,
        volume_a: quote_a.base_volume_24h,
        volume_b: quote_b.base_volume_24h,
        spread_pct,
    };

    Some(Alert::cross_exchange(dedup_key, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(binance: f64, gate: f64, threshold: f64) -> CrossExchangeParams {
        CrossExchangeParams {
            threshold_percent: threshold,
            volume_thresholds: HashMap::from([
                ("binance".to_string(), binance),
                ("gate".to_string(), gate),
            ]),
        }
    }

    #[test]
    fn s3_volume_gate_then_spread_emits() {
        let binance = VenueId::from("binance");
        let gate = VenueId::from("gate");
        let a = VenueQuote { price: 2000.0, base_volume_24h: 25_000_000.0 };
        let b_failing = VenueQuote { price: 2006.0, base_volume_24h: 4_000_000.0 };

        let failing_params = params(20_000_000.0, 5_000_000.0, 0.2);
        assert!(evaluate("ETH", &binance, a, &gate, b_failing, &failing_params).is_none());

        let b_passing = VenueQuote { price: 2006.0, base_volume_24h: 6_000_000.0 };
        let passing_params = params(20_000_000.0, 5_000_000.0, 0.2);
        let alert = evaluate("ETH", &binance, a, &gate, b_passing, &passing_params).unwrap();
        let crate::model::AlertPayload::CrossExchange(payload) = alert.payload else {
            panic!("expected a cross-exchange payload");
        };
        assert!((payload.spread_pct - 0.3).abs() < 1e-9);
        assert_eq!(payload.higher_venue, "gate");
    }

    #[test]
    fn equal_prices_never_emit() {
        let binance = VenueId::from("binance");
        let gate = VenueId::from("gate");
        let q = VenueQuote { price: 2000.0, base_volume_24h: 100_000_000.0 };
        let params = params(0.0, 0.0, 0.0);
        assert!(evaluate("ETH", &binance, q, &gate, q, &params).is_none());
    }
}
