//! Bounded rolling window of OHLCV bars for one (venue, symbol) (§3, §4.3).

use std::collections::VecDeque;

use crate::model::{Bar, Ticker};

/// Ordered, timestamp-deduplicated ring buffer. Invariants (§8):
/// - at most one bar per timestamp
/// - strictly ascending order on read
/// - length never exceeds `capacity`
#[derive(Debug, Clone)]
pub struct RollingWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new bar was appended (newer timestamp than anything held).
    Appended,
    /// The bar at this timestamp was replaced in place (live-candle update).
    Replaced,
    /// The bar was rejected: invalid fields, or an out-of-order timestamp
    /// older than the newest bar held (rare, but not an invariant violation
    /// to reject rather than silently reorder).
    Rejected,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    /// `record_bar` (§4.3): replaces the bar at an equal timestamp, appends
    /// on strictly newer, evicts the oldest once over capacity. Rejects
    /// invalid bars and out-of-order timestamps older than the last one.
    pub fn record(&mut self, bar: Bar) -> RecordOutcome {
        if !bar.is_valid() {
            return RecordOutcome::Rejected;
        }

        match self.bars.back() {
            None => {
                self.bars.push_back(bar);
                RecordOutcome::Appended
            }
            Some(last) if bar.ts_ms == last.ts_ms => {
                *self.bars.back_mut().expect("checked Some above") = bar;
                RecordOutcome::Replaced
            }
            Some(last) if bar.ts_ms > last.ts_ms => {
                self.bars.push_back(bar);
                if self.bars.len() > self.capacity {
                    self.bars.pop_front();
                }
                RecordOutcome::Appended
            }
            Some(_) => {
                // Out-of-order timestamp older than the tail: could only be
                // a replace if it matches an earlier slot, which would
                // violate "strictly ascending" if we edited it in place.
                if let Some(slot) = self.bars.iter_mut().find(|b| b.ts_ms == bar.ts_ms) {
                    *slot = bar;
                    RecordOutcome::Replaced
                } else {
                    RecordOutcome::Rejected
                }
            }
        }
    }

    /// A consistent, ascending-order copy of the bars held.
    pub fn bars(&self) -> Vec<Bar> {
        self.bars.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<Bar> {
        self.bars.back().copied()
    }
}

/// Per-(venue, symbol) state: the rolling window plus the latest ticker,
/// merged into the same lock domain (§4.3: "merged into the same per-key
/// lock domain as `record_bar`").
#[derive(Debug, Clone)]
pub struct SymbolState {
    pub window: RollingWindow,
    pub ticker: Option<Ticker>,
}

impl SymbolState {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RollingWindow::new(capacity),
            ticker: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts_ms: i64, close: f64, volume: f64) -> Bar {
        Bar { ts_ms, open: close, high: close, low: close, close, volume }
    }

    #[test]
    fn appends_strictly_newer_bars() {
        let mut w = RollingWindow::new(10);
        assert_eq!(w.record(bar(1, 100.0, 1.0)), RecordOutcome::Appended);
        assert_eq!(w.record(bar(2, 101.0, 1.0)), RecordOutcome::Appended);
        assert_eq!(w.bars().len(), 2);
        assert!(w.bars().windows(2).all(|p| p[0].ts_ms < p[1].ts_ms));
    }

    #[test]
    fn replaces_same_timestamp_in_place() {
        let mut w = RollingWindow::new(10);
        w.record(bar(1, 100.0, 1.0));
        assert_eq!(w.record(bar(1, 105.0, 2.0)), RecordOutcome::Replaced);
        assert_eq!(w.len(), 1);
        assert_eq!(w.latest().unwrap().close, 105.0);
    }

    #[test]
    fn idempotent_replace_with_identical_payload_leaves_window_unchanged() {
        let mut w = RollingWindow::new(10);
        w.record(bar(1, 100.0, 5.0));
        let before = w.bars();
        w.record(bar(1, 100.0, 5.0));
        assert_eq!(w.bars(), before);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut w = RollingWindow::new(3);
        for i in 0..5 {
            w.record(bar(i, 100.0 + i as f64, 1.0));
        }
        assert_eq!(w.len(), 3);
        let bars = w.bars();
        assert_eq!(bars.first().unwrap().ts_ms, 2);
        assert_eq!(bars.last().unwrap().ts_ms, 4);
    }

    #[test]
    fn rejects_invalid_bar() {
        let mut w = RollingWindow::new(10);
        assert_eq!(w.record(bar(1, -1.0, 1.0)), RecordOutcome::Rejected);
        assert!(w.is_empty());
    }

    #[test]
    fn rejects_non_finite_fields() {
        let mut w = RollingWindow::new(10);
        let mut b = bar(1, 100.0, 1.0);
        b.volume = f64::NAN;
        assert_eq!(w.record(b), RecordOutcome::Rejected);
    }

    #[test]
    fn out_of_order_older_timestamp_without_existing_slot_is_rejected() {
        let mut w = RollingWindow::new(10);
        w.record(bar(10, 100.0, 1.0));
        w.record(bar(20, 101.0, 1.0));
        assert_eq!(w.record(bar(5, 99.0, 1.0)), RecordOutcome::Rejected);
        assert_eq!(w.len(), 2);
    }
}
