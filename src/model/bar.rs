//! OHLCV bar and rolling-window item types.

use serde::{Deserialize, Serialize};

/// One OHLCV candle. `ts_ms` is minute-aligned for the default 1m timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Validates the invariants required before a bar is admitted to the store:
    /// all fields finite, non-negative, and `close > 0`.
    pub fn is_valid(&self) -> bool {
        self.ts_ms >= 0
            && [self.open, self.high, self.low, self.close, self.volume]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0)
            && self.close > 0.0
    }
}

/// Latest ticker snapshot for a (venue, symbol) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub base_volume_24h: f64,
    pub quote_volume_24h: f64,
    pub ts_ms: i64,
}

impl Ticker {
    pub fn is_valid(&self) -> bool {
        [self.bid, self.ask, self.last, self.base_volume_24h, self.quote_volume_24h]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64, volume: f64) -> Bar {
        Bar { ts_ms: 1_000, open: close, high: close, low: close, close, volume }
    }

    #[test]
    fn rejects_non_finite_fields() {
        assert!(!bar(f64::NAN, 1.0).is_valid());
        assert!(!bar(f64::INFINITY, 1.0).is_valid());
    }

    #[test]
    fn rejects_non_positive_close() {
        assert!(!bar(0.0, 1.0).is_valid());
        assert!(!bar(-1.0, 1.0).is_valid());
    }

    #[test]
    fn rejects_negative_volume() {
        assert!(!bar(100.0, -1.0).is_valid());
    }

    #[test]
    fn accepts_well_formed_bar() {
        assert!(bar(100.0, 0.0).is_valid());
    }
}
