//! Exponential backoff with jitter, adapted from the teacher's
//! `BackoffCalculator` (`src/scrapers/binance_session.rs`) to take its
//! tuning knobs directly instead of through a Binance-specific session
//! config, since the stream supervisor applies one calculator per
//! (venue, symbol, timeframe) task across all four venues.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffParams {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for BackoffParams {
    fn default() -> Self {
        Self { base_ms: 100, max_ms: 30_000, multiplier: 2.0, jitter_factor: 0.3 }
    }
}

/// Fast PRNG for jitter (xorshift64), seeded from the wall clock once at
/// construction — not reseeded per backoff, since the whole point is to
/// decorrelate many tasks reconnecting at once.
#[derive(Debug)]
pub struct BackoffCalculator {
    params: BackoffParams,
    attempt: u32,
    rng_state: u64,
}

impl BackoffCalculator {
    pub fn new(params: BackoffParams) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(12345);
        Self { params, attempt: 0, rng_state: seed | 1 }
    }

    pub fn with_seed(params: BackoffParams, seed: u64) -> Self {
        Self { params, attempt: 0, rng_state: seed | 1 }
    }

    #[inline]
    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f64) / (u64::MAX as f64)
    }

    /// Computes the next backoff duration and advances the attempt counter.
    pub fn next_backoff(&mut self) -> Duration {
        let base = (self.params.base_ms as f64) * self.params.multiplier.powi(self.attempt as i32);
        let capped = base.min(self.params.max_ms as f64);

        let jitter_range = capped * self.params.jitter_factor;
        let jitter = (self.next_random() * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped + jitter).max(self.params.base_ms as f64);

        self.attempt += 1;
        Duration::from_millis(final_ms as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_backoff_is_near_base() {
        let mut backoff = BackoffCalculator::with_seed(BackoffParams::default(), 42);
        let d = backoff.next_backoff();
        assert!(d.as_millis() >= 70 && d.as_millis() <= 130);
    }

    #[test]
    fn grows_with_attempts_then_caps() {
        let params = BackoffParams { base_ms: 100, max_ms: 1000, multiplier: 2.0, jitter_factor: 0.0 };
        let mut backoff = BackoffCalculator::with_seed(params, 7);
        let d1 = backoff.next_backoff();
        let d2 = backoff.next_backoff();
        let d3 = backoff.next_backoff();
        assert!(d1.as_millis() < d2.as_millis());
        assert!(d2.as_millis() < d3.as_millis());
        for _ in 0..20 {
            assert!(backoff.next_backoff().as_millis() <= 1000);
        }
    }

    #[test]
    fn reset_returns_attempt_to_zero() {
        let mut backoff = BackoffCalculator::with_seed(BackoffParams::default(), 1);
        backoff.next_backoff();
        backoff.next_backoff();
        assert_eq!(backoff.attempt(), 2);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }
}
