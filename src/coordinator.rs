//! Top-level coordinator (§2, §5): owns the store and supervisor set, runs
//! the periodic detector sweeps and maintenance pass, and unwinds
//! everything on a cancellation signal within a bounded timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::ExchangeAdapter;
use crate::catalog::SymbolCatalog;
use crate::config::AppConfig;
use crate::detectors::{volatility, DetectorEngine};
use crate::error::AppError;
use crate::model::VenueId;
use crate::notifier::{dispatch, Notifier};
use crate::store::MarketStateStore;
use crate::supervisor::backoff::BackoffParams;
use crate::supervisor::StreamSupervisor;

const MAINTENANCE_INTERVAL_SECS: u64 = 60;
const ADAPTER_CLOSE_TIMEOUT_SECS: u64 = 8;
const DEFAULT_TIMEFRAME: &str = "1m";
const DAILY_HISTORY_DAYS: usize = 30;
const DAILY_HISTORY_TIMEFRAME: &str = "1d";

pub struct Coordinator {
    config: Arc<AppConfig>,
    catalog: Arc<SymbolCatalog>,
    store: Arc<MarketStateStore>,
    supervisor: Arc<StreamSupervisor>,
    detectors: Arc<DetectorEngine>,
    notifier: Arc<dyn Notifier>,
    adapters: HashMap<VenueId, Arc<dyn ExchangeAdapter>>,
    cancel: CancellationToken,
    /// Bounds one-shot requests (daily-history fetches), separate from the
    /// per-venue stream semaphore owned by `StreamSupervisor` (§5).
    request_semaphore: Arc<Semaphore>,
}

impl Coordinator {
    pub fn new(
        config: Arc<AppConfig>,
        catalog: Arc<SymbolCatalog>,
        store: Arc<MarketStateStore>,
        adapters: HashMap<VenueId, Arc<dyn ExchangeAdapter>>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        let backoff_params = BackoffParams {
            base_ms: config.retry_delay_seconds.saturating_mul(1000).max(1),
            ..BackoffParams::default()
        };
        let supervisor = Arc::new(StreamSupervisor::new(
            adapters.clone(),
            catalog.clone(),
            store.clone(),
            cancel.clone(),
            config.max_concurrent_streams_per_venue,
            backoff_params,
            config.max_retries,
        ));
        let request_semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        Self {
            config,
            catalog,
            store,
            supervisor,
            detectors: Arc::new(DetectorEngine::new()),
            notifier,
            adapters,
            cancel,
            request_semaphore,
        }
    }

    fn venues(&self) -> Vec<VenueId> {
        self.config.exchanges.iter().map(|v| VenueId::from(v.as_str())).collect()
    }

    fn perp_venues(&self) -> Vec<VenueId> {
        self.config.perp_exchanges.iter().map(|v| VenueId::from(v.as_str())).collect()
    }

    /// Loads every configured venue's catalog once at startup. A venue
    /// whose `load_markets` fails is dropped and logged; the others
    /// continue (§7: `AdapterInitFailure` — "Venue dropped; others
    /// continue").
    pub async fn load_catalogs(&self) {
        let mut venues = self.venues();
        for v in self.perp_venues() {
            if !venues.contains(&v) {
                venues.push(v);
            }
        }

        for venue in venues {
            let Some(adapter) = self.adapters.get(&venue) else { continue };
            match self.catalog.load_venue(&venue, adapter.as_ref()).await {
                Ok(count) => info!(venue = %venue, symbols = count, "catalog loaded"),
                Err(err) => {
                    let app_err = AppError::AdapterInitFailure { venue: venue.to_string(), source: err };
                    warn!(venue = %venue, error = %app_err, "catalog load failed, venue dropped");
                }
            }
        }
    }

    /// Runs the full pipeline until `cancel` fires: a supervisor
    /// reconciliation + detector-sweep loop paced by `SCAN_INTERVAL_SECONDS`,
    /// and an independent maintenance loop pacing cooldown/cache eviction.
    pub async fn run(&self) {
        self.load_catalogs().await;

        let mut scan_tick = interval(Duration::from_secs(self.config.scan_interval_seconds));
        scan_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut maintenance_tick = interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        maintenance_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("shutdown signal received, draining");
                    break;
                }

                _ = scan_tick.tick() => {
                    self.reconcile_streams();
                    self.run_detector_sweep().await;
                }

                _ = maintenance_tick.tick() => {
                    self.detectors.purge_expired(chrono::Utc::now());
                    self.refresh_daily_cache().await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Fetches daily history for every eligible instrument whose daily-cache
    /// coverage is missing or past its TTL, bounded by `request_semaphore`
    /// (§5 `MAX_CONCURRENT_REQUESTS`), feeding the volatility detector's
    /// advisory 30-day percentile (§3, §4.5). A fetch failure is logged and
    /// skipped — never blocks the maintenance pass or gates emission.
    async fn refresh_daily_cache(&self) {
        let now = chrono::Utc::now();
        let mut wanted = Vec::new();
        for venue in self.venues() {
            wanted.extend(self.catalog.spot_symbols(&venue, None));
            wanted.extend(self.catalog.perpetual_symbols(&venue, None));
        }

        let due: Vec<_> = wanted
            .into_iter()
            .filter(|instrument| volatility::eligible(instrument))
            .filter(|instrument| self.detectors.daily_cache.needs_refresh(&instrument.venue, &instrument.raw_symbol, now))
            .collect();

        if due.is_empty() {
            return;
        }

        let since_ms = (now - chrono::Duration::days(DAILY_HISTORY_DAYS as i64)).timestamp_millis();
        let mut handles = Vec::with_capacity(due.len());
        for instrument in due {
            let Some(adapter) = self.adapters.get(&instrument.venue).cloned() else { continue };
            let semaphore = self.request_semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let bars = adapter
                    .fetch_ohlcv(&instrument.raw_symbol, DAILY_HISTORY_TIMEFRAME, since_ms, DAILY_HISTORY_DAYS)
                    .await;
                (instrument, bars)
            }));
        }

        for handle in handles {
            let Ok((instrument, result)) = handle.await else { continue };
            match result {
                Ok(bars) => {
                    self.detectors.daily_cache.put(&instrument.venue, &instrument.raw_symbol, bars, now);
                }
                Err(err) => {
                    warn!(
                        venue = %instrument.venue,
                        symbol = %instrument.raw_symbol,
                        error = %err,
                        "daily history fetch failed, percentile annotation skipped"
                    );
                }
            }
        }
    }

    fn reconcile_streams(&self) {
        let mut wanted = Vec::new();
        for venue in self.venues() {
            wanted.extend(self.catalog.spot_symbols(&venue, None));
            wanted.extend(self.catalog.perpetual_symbols(&venue, None));
        }
        for venue in self.perp_venues() {
            wanted.extend(self.catalog.perpetual_symbols(&venue, None));
        }
        self.supervisor.reconcile(&wanted, DEFAULT_TIMEFRAME);
    }

    async fn run_detector_sweep(&self) {
        let now = chrono::Utc::now();
        let venues = self.venues();
        let perp_venues = self.perp_venues();

        let mut alerts = self.detectors.run_volatility_sweep(&self.catalog, &self.store, &self.config, &venues, now);
        alerts.extend(self.detectors.run_basis_sweep(&self.catalog, &self.store, &self.config, &venues, now));
        alerts.extend(
            self.detectors
                .run_cross_exchange_sweep(&self.catalog, &self.store, &self.config, &perp_venues, now),
        );

        if alerts.is_empty() {
            return;
        }
        info!(count = alerts.len(), "dispatching alerts");
        dispatch(self.notifier.as_ref(), alerts).await;
    }

    /// Cancels all stream tasks, then closes every adapter with a bounded
    /// timeout; stragglers are abandoned rather than blocking shutdown
    /// (§5, §4.9: "Adapter close timeout | Abandon, log warning").
    async fn shutdown(&self) {
        self.supervisor.shutdown().await;

        for (venue, adapter) in &self.adapters {
            let result = timeout(Duration::from_secs(ADAPTER_CLOSE_TIMEOUT_SECS), adapter.close()).await;
            match result {
                Ok(Ok(())) => info!(venue = %venue, "adapter closed"),
                Ok(Err(err)) => warn!(venue = %venue, error = %err, "adapter close failed"),
                Err(_) => warn!(venue = %venue, "adapter close timed out, abandoning"),
            }
        }
    }
}
