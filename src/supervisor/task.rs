//! Per-(venue, symbol, timeframe) stream task state machine (§4.4).
//!
//! One task owns one venue's one symbol's one timeframe for the life of the
//! process (until evicted). It runs both the OHLCV and ticker cursors
//! concurrently, reconnecting transient failures with backoff and retiring
//! itself permanently on a symbol-level error — the same "per-stream
//! supervisor task" shape as the teacher's `binance_session.rs` connection
//! loop, generalized from one hardcoded venue to the `ExchangeAdapter` trait.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::error::{classify, AdapterErrorKind};
use crate::adapter::ExchangeAdapter;
use crate::catalog::SymbolCatalog;
use crate::error::AppError;
use crate::store::MarketStateStore;

use super::backoff::{BackoffCalculator, BackoffParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Backoff,
    Invalid,
}

pub struct StreamTask {
    pub venue: crate::model::VenueId,
    pub raw_symbol: String,
    pub timeframe: String,
    adapter: Arc<dyn ExchangeAdapter>,
    catalog: Arc<SymbolCatalog>,
    store: Arc<MarketStateStore>,
    cancel: CancellationToken,
    backoff: BackoffCalculator,
    max_retries: u32,
}

impl StreamTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: crate::model::VenueId,
        raw_symbol: String,
        timeframe: String,
        adapter: Arc<dyn ExchangeAdapter>,
        catalog: Arc<SymbolCatalog>,
        store: Arc<MarketStateStore>,
        cancel: CancellationToken,
        backoff_params: BackoffParams,
        max_retries: u32,
    ) -> Self {
        Self {
            venue,
            raw_symbol,
            timeframe,
            adapter,
            catalog,
            store,
            cancel,
            backoff: BackoffCalculator::new(backoff_params),
            max_retries,
        }
    }

    /// Evicts this symbol permanently: marks it invalid in the catalog and
    /// drops its store entry so nothing reads stale state for it again.
    fn evict(&self) {
        self.catalog.mark_invalid(&self.venue, &self.raw_symbol);
        self.store.remove(&self.venue, &self.raw_symbol);
    }

    /// Runs until the task is cancelled or the symbol is permanently
    /// evicted. Never returns an `Err` — all failures are handled as state
    /// transitions internal to the loop.
    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                debug!(venue = %self.venue, symbol = %self.raw_symbol, "stream task cancelled");
                return;
            }

            match self.run_one_connection().await {
                Ok(()) => {
                    // Cursor ended cleanly (cancellation raced the stream close).
                    return;
                }
                Err(err) => match classify(&err) {
                    AdapterErrorKind::PermanentSymbol => {
                        let app_err = AppError::PermanentSymbol {
                            venue: self.venue.to_string(),
                            symbol: self.raw_symbol.clone(),
                            source: err,
                        };
                        warn!(
                            venue = %self.venue,
                            symbol = %self.raw_symbol,
                            error = %app_err,
                            "permanent symbol error, evicting from catalog"
                        );
                        self.evict();
                        return;
                    }
                    AdapterErrorKind::Unexpected => {
                        warn!(
                            venue = %self.venue,
                            symbol = %self.raw_symbol,
                            error = %err,
                            "unexpected stream error, exiting task"
                        );
                        return;
                    }
                    AdapterErrorKind::Transient => {
                        let wait = self.backoff.next_backoff();
                        if self.backoff.attempt() > self.max_retries {
                            let app_err = AppError::TransientAdapter {
                                venue: self.venue.to_string(),
                                symbol: self.raw_symbol.clone(),
                                source: err,
                            };
                            warn!(
                                venue = %self.venue,
                                symbol = %self.raw_symbol,
                                attempt = self.backoff.attempt(),
                                max_retries = self.max_retries,
                                error = %app_err,
                                "retry budget exhausted, evicting from catalog"
                            );
                            self.evict();
                            return;
                        }
                        debug!(
                            venue = %self.venue,
                            symbol = %self.raw_symbol,
                            attempt = self.backoff.attempt(),
                            wait_ms = wait.as_millis() as u64,
                            error = %err,
                            "transient stream error, backing off"
                        );
                        tokio::select! {
                            _ = sleep(wait) => {}
                            _ = self.cancel.cancelled() => return,
                        }
                    }
                },
            }
        }
    }

    async fn run_one_connection(&mut self) -> anyhow::Result<()> {
        let mut klines = self.adapter.watch_ohlcv(&self.raw_symbol, &self.timeframe).await?;
        let mut ticker = self.adapter.watch_ticker(&self.raw_symbol).await?;

        info!(venue = %self.venue, symbol = %self.raw_symbol, "stream connected");
        self.backoff.reset();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),

                bar = klines.advance() => {
                    let bar = bar?;
                    self.store.record_bar(&self.venue, &self.raw_symbol, bar);
                }

                tick = ticker.advance() => {
                    let tick = tick?;
                    self.store.record_ticker(&self.venue, &self.raw_symbol, tick);
                }
            }
        }
    }
}
