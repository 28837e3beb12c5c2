//! Volatility Detector (§4.5): a price move combined with a volume spike on
//! a single (venue, symbol).

use crate::model::{
    Alert, Bar, Instrument, InstrumentKind, VolatilityPayload,
};

use super::daily_cache::PercentileInfo;

#[derive(Debug, Clone, Copy)]
pub struct VolatilityParams {
    pub lookback_minutes: usize,
    pub min_price_increase_percent: f64,
    pub min_price_decrease_percent: f64,
    pub detect_downside: bool,
    pub volume_spike_threshold: f64,
}

/// Whether `instrument` is even eligible for the volatility detector at all
/// (§4.2: stablecoin pairs and dated futures are excluded).
pub fn eligible(instrument: &Instrument) -> bool {
    instrument.kind != InstrumentKind::DatedFuture && !instrument.is_stablecoin_pair()
}

#[derive(Debug, Clone, Copy)]
struct Computation {
    price_change_pct: f64,
    volume_ratio: f64,
    close_last: f64,
    close_ref: f64,
    volume_last: f64,
    mean_volume: f64,
}

/// Computes the move/ratio pair from the last `min(lookback, bars.len())`
/// bars, or `None` if fewer than 2 bars are available — the boundary case
/// from §8: "with L = 1 the volatility detector is inert".
fn compute(bars: &[Bar], lookback_minutes: usize) -> Option<Computation> {
    if bars.len() < 2 {
        return None;
    }
    let take = lookback_minutes.max(1).min(bars.len());
    let window = &bars[bars.len() - take..];
    if window.len() < 2 {
        return None;
    }

    let close_ref = window.first()?.close;
    let last = window.last()?;
    let close_last = last.close;
    let volume_last = last.volume;

    let history = &window[..window.len() - 1];
    let mean_volume = history.iter().map(|b| b.volume).sum::<f64>() / history.len() as f64;

    let volume_ratio = if mean_volume > 0.0 {
        volume_last / mean_volume
    } else if volume_last > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let price_change_pct = if close_ref > 0.0 { (close_last - close_ref) / close_ref * 100.0 } else { 0.0 };

    Some(Computation { price_change_pct, volume_ratio, close_last, close_ref, volume_last, mean_volume })
}

/// Evaluates one (venue, symbol)'s bars and returns an alert if the
/// thresholds are crossed. `percentile` is advisory-only (§9 Open Question
/// 4) and never affects whether an alert fires.
pub fn evaluate(
    instrument: &Instrument,
    bars: &[Bar],
    params: &VolatilityParams,
    percentile: Option<PercentileInfo>,
) -> Option<Alert> {
    if !eligible(instrument) {
        return None;
    }

    let computation = compute(bars, params.lookback_minutes)?;

    let upside = computation.price_change_pct >= params.min_price_increase_percent;
    let downside = params.detect_downside && computation.price_change_pct <= -params.min_price_decrease_percent;
    let price_triggered = upside || downside;
    let volume_triggered = computation.volume_ratio >= params.volume_spike_threshold;

    if !(price_triggered && volume_triggered) {
        return None;
    }

    let dedup_key = format!("volatility:{}:{}", instrument.venue, instrument.raw_symbol);
    let payload = VolatilityPayload {
        venue: instrument.venue.to_string(),
        symbol: instrument.raw_symbol.clone(),
        current_price: computation.close_last,
        reference_price: computation.close_ref,
        price_change_pct: computation.price_change_pct,
        current_volume: computation.volume_last,
        average_volume: computation.mean_volume,
        volume_ratio: computation.volume_ratio,
        price_percentile: percentile.map(|p| p.price_percentile),
        thirty_day_high: percentile.map(|p| p.thirty_day_high),
        thirty_day_low: percentile.map(|p| p.thirty_day_low),
        thirty_day_avg: percentile.map(|p| p.thirty_day_avg),
    };

    Some(Alert::volatility(dedup_key, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarketMeta, VenueId};

    fn bar(ts_ms: i64, close: f64, volume: f64) -> Bar {
        Bar { ts_ms, open: close, high: close, low: close, close, volume }
    }

    fn instrument(kind: InstrumentKind, base: &str, quote: &str) -> Instrument {
        Instrument {
            venue: VenueId::from("binance"),
            raw_symbol: format!("{base}/{quote}"),
            canonical_base: base.to_string(),
            kind,
            meta: MarketMeta { active: true, base: base.to_string(), quote: quote.to_string(), is_swap: false, is_future: false },
        }
    }

    fn default_params() -> VolatilityParams {
        VolatilityParams {
            lookback_minutes: 5,
            min_price_increase_percent: 2.0,
            min_price_decrease_percent: 2.0,
            detect_downside: false,
            volume_spike_threshold: 5.0,
        }
    }

    #[test]
    fn s1_volatility_single_emission() {
        let instrument = instrument(InstrumentKind::Spot, "BTC", "USDT");
        let closes = [100.0, 100.0, 100.0, 100.0, 100.0, 103.0];
        let volumes = [10.0, 10.0, 10.0, 10.0, 10.0, 60.0];
        let bars: Vec<Bar> = closes.iter().zip(volumes.iter()).enumerate()
            .map(|(i, (&c, &v))| bar(i as i64, c, v)).collect();

        let alert = evaluate(&instrument, &bars, &default_params(), None).unwrap();
        let crate::model::AlertPayload::Volatility(payload) = alert.payload else {
            panic!("expected a volatility payload");
        };
        assert!((payload.price_change_pct - 3.0).abs() < 1e-9);
        assert_eq!(payload.volume_ratio, 6.0);
    }

    #[test]
    fn inert_with_single_bar() {
        let instrument = instrument(InstrumentKind::Spot, "BTC", "USDT");
        let bars = vec![bar(0, 100.0, 10.0)];
        assert!(evaluate(&instrument, &bars, &default_params(), None).is_none());
    }

    #[test]
    fn zero_thresholds_fire_on_any_non_excluded_bar() {
        let instrument = instrument(InstrumentKind::Spot, "BTC", "USDT");
        let bars = vec![bar(0, 100.0, 1.0), bar(1, 100.0, 1.0)];
        let params = VolatilityParams {
            lookback_minutes: 5,
            min_price_increase_percent: 0.0,
            min_price_decrease_percent: 0.0,
            detect_downside: false,
            volume_spike_threshold: 0.0,
        };
        assert!(evaluate(&instrument, &bars, &params, None).is_some());
    }

    #[test]
    fn stablecoin_pair_is_excluded() {
        let instrument = instrument(InstrumentKind::Spot, "USDT", "USDC");
        let bars = vec![bar(0, 1.0, 1.0), bar(1, 1.03, 10.0)];
        assert!(evaluate(&instrument, &bars, &default_params(), None).is_none());
    }

    #[test]
    fn dated_future_is_excluded() {
        let instrument = instrument(InstrumentKind::DatedFuture, "BTC", "USDT");
        let bars = vec![bar(0, 100.0, 1.0), bar(1, 110.0, 100.0)];
        assert!(evaluate(&instrument, &bars, &default_params(), None).is_none());
    }

    #[test]
    fn downside_move_ignored_unless_enabled() {
        let instrument = instrument(InstrumentKind::Spot, "BTC", "USDT");
        let bars = vec![bar(0, 100.0, 1.0), bar(1, 95.0, 10.0)];
        assert!(evaluate(&instrument, &bars, &default_params(), None).is_none());

        let mut params = default_params();
        params.detect_downside = true;
        assert!(evaluate(&instrument, &bars, &params, None).is_some());
    }
}
