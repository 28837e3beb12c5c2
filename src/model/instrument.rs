//! Instrument identity and classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stablecoins recognized for the spot/stablecoin-pair exclusion rule (§4.2).
pub const STABLECOINS: &[&str] =
    &["USDT", "USDC", "DAI", "BUSD", "UST", "TUSD", "USDP", "USDK", "PAX"];

/// A venue identifier (e.g. "binance", "okx", "bybit", "gate").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueId(pub String);

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        VenueId(s.to_string())
    }
}

/// Classification of a tradeable instrument, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Spot,
    Perpetual,
    DatedFuture,
}

/// Market metadata as reported by an adapter's `load_markets` call (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMeta {
    pub active: bool,
    pub base: String,
    pub quote: String,
    pub is_swap: bool,
    pub is_future: bool,
}

/// A fully classified, canonicalized instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub venue: VenueId,
    pub raw_symbol: String,
    pub canonical_base: String,
    pub kind: InstrumentKind,
    pub meta: MarketMeta,
}

impl Instrument {
    /// Both sides of the pair are stablecoins (§4.2 volatility-detector exclusion).
    pub fn is_stablecoin_pair(&self) -> bool {
        let base_is_stable = STABLECOINS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&self.meta.base));
        let quote_is_stable = STABLECOINS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&self.meta.quote));
        base_is_stable && quote_is_stable
    }
}
