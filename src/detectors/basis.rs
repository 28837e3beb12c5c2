//! Basis Detector (§4.6): spot vs perpetual gap within one venue.

use crate::config::BasisDirectionFilter;
use crate::model::{Alert, BasisDirection, BasisPayload, VenueId};

#[derive(Debug, Clone, Copy)]
pub struct BasisParams {
    pub threshold_percent: f64,
    pub direction_filter: BasisDirectionFilter,
}

/// `basis_pct = (future_close - spot_close) / spot_close * 100` (§4.6,
/// GLOSSARY). Returns `None` when `spot_close <= 0` — there is no
/// meaningful basis to report.
fn basis_pct(spot_close: f64, future_close: f64) -> Option<f64> {
    if spot_close <= 0.0 {
        return None;
    }
    Some((future_close - spot_close) / spot_close * 100.0)
}

fn direction_matches(pct: f64, filter: BasisDirectionFilter) -> bool {
    match filter {
        BasisDirectionFilter::Both => true,
        BasisDirectionFilter::Premium => pct > 0.0,
        BasisDirectionFilter::Discount => pct < 0.0,
    }
}

/// Evaluates one matched spot/perpetual pair on one venue. `spot_symbol`
/// and `future_symbol` are the raw symbols as seen in the snapshot.
pub fn evaluate(
    venue: &VenueId,
    spot_symbol: &str,
    future_symbol: &str,
    spot_close: f64,
    future_close: f64,
    params: &BasisParams,
) -> Option<Alert> {
    let pct = basis_pct(spot_close, future_close)?;

    if pct.abs() < params.threshold_percent {
        return None;
    }
    if !direction_matches(pct, params.direction_filter) {
        return None;
    }

    let direction = if pct > 0.0 { BasisDirection::Premium } else { BasisDirection::Discount };
    let dedup_key = format!("basis:{venue}:{spot_symbol}:{future_symbol}");

    let payload = BasisPayload {
        venue: venue.to_string(),
        spot_symbol: spot_symbol.to_string(),
        future_symbol: future_symbol.to_string(),
        spot_price: spot_close,
        future_price: future_close,
        price_difference_percent: pct,
        direction,
    };

    Some(Alert::basis(dedup_key, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_basis_discount_skipped_then_both_emits() {
        let venue = VenueId::from("binance");
        let premium_only =
            BasisParams { threshold_percent: 0.1, direction_filter: BasisDirectionFilter::Premium };
        assert!(evaluate(&venue, "BTC/USDT", "BTC/USDT:USDT", 100.0, 99.8, &premium_only).is_none());

        let both = BasisParams { threshold_percent: 0.1, direction_filter: BasisDirectionFilter::Both };
        let alert = evaluate(&venue, "BTC/USDT", "BTC/USDT:USDT", 100.0, 99.8, &both).unwrap();
        let crate::model::AlertPayload::Basis(payload) = alert.payload else {
            panic!("expected a basis payload");
        };
        assert!((payload.price_difference_percent - (-0.2)).abs() < 1e-9);
        assert_eq!(payload.direction, BasisDirection::Discount);
    }

    #[test]
    fn below_threshold_does_not_emit() {
        let venue = VenueId::from("binance");
        let params = BasisParams { threshold_percent: 0.5, direction_filter: BasisDirectionFilter::Both };
        assert!(evaluate(&venue, "BTC/USDT", "BTC/USDT:USDT", 100.0, 100.1, &params).is_none());
    }

    #[test]
    fn non_positive_spot_price_does_not_emit() {
        let venue = VenueId::from("binance");
        let params = BasisParams { threshold_percent: 0.1, direction_filter: BasisDirectionFilter::Both };
        assert!(evaluate(&venue, "BTC/USDT", "BTC/USDT:USDT", 0.0, 100.0, &params).is_none());
    }
}
