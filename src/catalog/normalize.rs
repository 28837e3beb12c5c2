//! Symbol canonicalization and classification (§3, §4.2).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{InstrumentKind, MarketMeta};

/// Suffixes/infixes stripped when computing a canonical base, per §3.
const MARKERS: &[&str] = &[
    "_PERP", "-SWAP", "-FUTURES", ":USDT", "PERP", "/USDT", "USDT", "USDC", "BUSD", "USD",
];

/// Any of these patterns present in the raw symbol marks it a dated future (§3).
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}",
        r"\d{4}-\d{2}",
        r"\d{2}-\d{2}-\d{2}",
        r"\d{2}-\d{2}",
        r"\d{8}",
        r"\d{6}",
        r"\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static date pattern is valid regex"))
    .collect()
});

/// `PERP`/swap markers that identify a perpetual when the adapter itself
/// doesn't flag `is_swap`/`is_future` (raw-symbol fallback per §3).
const PERPETUAL_MARKERS: &[&str] = &["PERP", "_PERP", "-SWAP", ":USDT", ":USDC"];

/// Strips known suffixes/infixes and takes the left side of a `/` split.
///
/// `canonicalize(canonicalize(s)) == canonicalize(s)` (§8 round-trip law):
/// once markers are stripped and the string has no more `/`, re-running finds
/// nothing further to strip.
pub fn canonicalize(raw_symbol: &str) -> String {
    let mut s = raw_symbol.to_string();
    for marker in MARKERS {
        s = s.replace(marker, "");
    }
    if let Some((base, _quote)) = s.split_once('/') {
        s = base.to_string();
    }
    s.trim_matches(|c| c == '_' || c == '-' || c == ':' || c == '/')
        .to_string()
}

fn has_date_pattern(raw_symbol: &str) -> bool {
    DATE_PATTERNS.iter().any(|re| re.is_match(raw_symbol))
}

fn has_perpetual_marker(raw_symbol: &str) -> bool {
    PERPETUAL_MARKERS.iter().any(|m| raw_symbol.contains(m))
}

/// Classifies a raw symbol given the adapter-reported market metadata, per §3:
/// spot (no futures marker, stablecoin quote) / perpetual (swap/future flag
/// or raw-symbol marker, no date pattern) / dated future (otherwise, matched
/// by a date regex).
///
/// Every raw symbol falls into exactly one of `{spot, perpetual, dated}` —
/// `ignored` (blacklist, stablecoin-pair exclusion, per-venue cap) is applied
/// by the catalog on top of this classification, not here.
pub fn classify(raw_symbol: &str, meta: &MarketMeta) -> InstrumentKind {
    let marked_derivative = meta.is_swap || meta.is_future || has_perpetual_marker(raw_symbol);

    if has_date_pattern(raw_symbol) && marked_derivative {
        return InstrumentKind::DatedFuture;
    }

    if marked_derivative {
        return InstrumentKind::Perpetual;
    }

    InstrumentKind::Spot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarketMeta;

    fn meta(is_swap: bool, is_future: bool) -> MarketMeta {
        MarketMeta {
            active: true,
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            is_swap,
            is_future,
        }
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for s in ["BTC/USDT", "BTC/USDT:USDT", "BTCUSDT_PERP", "ETH-SWAP", "SOLUSDT"] {
            let once = canonicalize(s);
            let twice = canonicalize(&once);
            assert_eq!(once, twice, "canonicalize not idempotent for {s}");
        }
    }

    #[test]
    fn canonicalize_strips_common_markers() {
        assert_eq!(canonicalize("BTC/USDT"), "BTC");
        assert_eq!(canonicalize("BTC/USDT:USDT"), "BTC");
        assert_eq!(canonicalize("ETH-SWAP"), "ETH");
        assert_eq!(canonicalize("SOLUSDT"), "SOL");
        assert_eq!(canonicalize("DOGE_PERP"), "DOGE");
    }

    #[test]
    fn classifies_plain_spot() {
        assert_eq!(classify("BTC/USDT", &meta(false, false)), InstrumentKind::Spot);
    }

    #[test]
    fn classifies_perpetual_by_adapter_flag() {
        assert_eq!(classify("BTC/USDT:USDT", &meta(true, false)), InstrumentKind::Perpetual);
    }

    #[test]
    fn classifies_perpetual_by_raw_symbol_marker() {
        assert_eq!(classify("BTCUSDT_PERP", &meta(false, false)), InstrumentKind::Perpetual);
    }

    #[test]
    fn classifies_dated_future_by_six_digit_date() {
        assert_eq!(classify("BTC/USDT:230628", &meta(true, false)), InstrumentKind::DatedFuture);
    }

    #[test]
    fn classifies_dated_future_by_four_digit_date() {
        assert_eq!(classify("BTCUSDT_0628", &meta(true, false)), InstrumentKind::DatedFuture);
    }

    #[test]
    fn non_derivative_symbol_with_digits_is_not_dated() {
        // A four-digit sequence alone is not enough without a derivative marker.
        assert_eq!(classify("1000SHIB/USDT", &meta(false, false)), InstrumentKind::Spot);
    }
}
