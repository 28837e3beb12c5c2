//! Immutable application configuration, loaded once from the environment.
//!
//! Mirrors the teacher's `Config::from_env` idiom: try an env var, parse it,
//! fall back to the documented default (§6). CLI flags (see `main.rs`)
//! override individual fields on top of the loaded value before any
//! component starts, per the "immutable configuration value passed into
//! constructors" design note (§9).

use std::collections::HashMap;
use std::env;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => {
            v.split(',').map(|s| s.trim().to_string()).collect()
        }
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisDirectionFilter {
    Both,
    Premium,
    Discount,
}

impl std::str::FromStr for BasisDirectionFilter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium" => Ok(Self::Premium),
            "discount" => Ok(Self::Discount),
            _ => Ok(Self::Both),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub exchanges: Vec<String>,
    pub perp_exchanges: Vec<String>,
    pub market_types: Vec<String>,
    pub scan_interval_seconds: u64,
    pub lookback_minutes: usize,
    pub min_price_increase_percent: f64,
    /// Supplemented per SPEC_FULL §3: symmetric downside threshold, off by default.
    pub min_price_decrease_percent: f64,
    pub detect_downside: bool,
    pub volume_spike_threshold: f64,
    pub spot_futures_diff_threshold: f64,
    pub spot_futures_basis_direction: BasisDirectionFilter,
    pub perp_diff_threshold: f64,
    pub perp_blacklist: Vec<String>,
    pub exchange_volume_thresholds: HashMap<String, f64>,
    pub max_concurrent_requests: usize,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub use_public_data_only: bool,
    pub volatility_cooldown_seconds: u64,
    pub basis_cooldown_seconds: u64,
    pub cross_exchange_cooldown_seconds: u64,
    pub max_concurrent_streams_per_venue: usize,
    pub daily_cache_expiry_hours: u64,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut exchange_volume_thresholds = HashMap::new();
        exchange_volume_thresholds.insert("binance".to_string(), 20_000_000.0);
        exchange_volume_thresholds.insert("gate".to_string(), 5_000_000.0);

        Self {
            exchanges: vec!["binance", "okx", "bybit", "gate"]
                .into_iter()
                .map(String::from)
                .collect(),
            perp_exchanges: vec!["binance", "gate"].into_iter().map(String::from).collect(),
            market_types: vec!["spot".to_string(), "future".to_string()],
            scan_interval_seconds: 30,
            lookback_minutes: 5,
            min_price_increase_percent: 2.0,
            min_price_decrease_percent: 2.0,
            detect_downside: false,
            volume_spike_threshold: 5.0,
            spot_futures_diff_threshold: 0.1,
            spot_futures_basis_direction: BasisDirectionFilter::Both,
            perp_diff_threshold: 0.2,
            perp_blacklist: Vec::new(),
            exchange_volume_thresholds,
            max_concurrent_requests: 20,
            request_timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            use_public_data_only: true,
            volatility_cooldown_seconds: 3600,
            basis_cooldown_seconds: 300,
            cross_exchange_cooldown_seconds: 300,
            max_concurrent_streams_per_venue: 500,
            daily_cache_expiry_hours: 6,
            log_level: "INFO".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut cfg = Self::default();

        cfg.exchanges = env_list("EXCHANGES", &["binance", "okx", "bybit", "gate"]);
        cfg.perp_exchanges = env_list("PERP_EXCHANGES", &["binance", "gate"]);
        cfg.market_types = env_list("MARKET_TYPES", &["spot", "future"]);
        cfg.scan_interval_seconds = env_parse("SCAN_INTERVAL_SECONDS", cfg.scan_interval_seconds);
        cfg.lookback_minutes = env_parse("LOOKBACK_MINUTES", cfg.lookback_minutes);
        cfg.min_price_increase_percent =
            env_parse("MIN_PRICE_INCREASE_PERCENT", cfg.min_price_increase_percent);
        cfg.min_price_decrease_percent =
            env_parse("MIN_PRICE_DECREASE_PERCENT", cfg.min_price_decrease_percent);
        cfg.detect_downside = env_parse("DETECT_DOWNSIDE", cfg.detect_downside);
        cfg.volume_spike_threshold =
            env_parse("VOLUME_SPIKE_THRESHOLD", cfg.volume_spike_threshold);
        cfg.spot_futures_diff_threshold = env_parse(
            "SPOT_FUTURES_DIFF_THRESHOLD",
            cfg.spot_futures_diff_threshold,
        );
        cfg.spot_futures_basis_direction = env::var("SPOT_FUTURES_BASIS_DIRECTION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(BasisDirectionFilter::Both);
        cfg.perp_diff_threshold = env_parse("PERP_DIFF_THRESHOLD", cfg.perp_diff_threshold);
        cfg.perp_blacklist = env_list("PERP_BLACKLIST", &[]);
        cfg.max_concurrent_requests =
            env_parse("MAX_CONCURRENT_REQUESTS", cfg.max_concurrent_requests);
        cfg.request_timeout_seconds =
            env_parse("REQUEST_TIMEOUT_SECONDS", cfg.request_timeout_seconds);
        cfg.max_retries = env_parse("MAX_RETRIES", cfg.max_retries);
        cfg.retry_delay_seconds = env_parse("RETRY_DELAY_SECONDS", cfg.retry_delay_seconds);
        cfg.use_public_data_only = env_parse("USE_PUBLIC_DATA_ONLY", cfg.use_public_data_only);
        cfg.log_level = env::var("LOG_LEVEL").unwrap_or(cfg.log_level);

        if let Ok(raw) = env::var("EXCHANGE_VOLUME_THRESHOLDS") {
            if let Some(parsed) = parse_volume_thresholds(&raw) {
                cfg.exchange_volume_thresholds = parsed;
            }
        }

        cfg
    }

    /// `W = max(LOOKBACK_MINUTES, 1000)` per §3 ("Rolling Window").
    pub fn window_capacity(&self) -> usize {
        self.lookback_minutes.max(1000)
    }
}

/// Parses a `venue:amount,venue:amount` list, tolerating the map-shaped env
/// var documented in §6 (`EXCHANGE_VOLUME_THRESHOLDS`).
fn parse_volume_thresholds(raw: &str) -> Option<HashMap<String, f64>> {
    let mut map = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (venue, amount) = entry.split_once(':')?;
        map.insert(venue.trim().to_string(), amount.trim().parse().ok()?);
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.exchanges, vec!["binance", "okx", "bybit", "gate"]);
        assert_eq!(cfg.perp_exchanges, vec!["binance", "gate"]);
        assert_eq!(cfg.scan_interval_seconds, 30);
        assert_eq!(cfg.lookback_minutes, 5);
        assert_eq!(cfg.min_price_increase_percent, 2.0);
        assert_eq!(cfg.volume_spike_threshold, 5.0);
        assert_eq!(cfg.spot_futures_diff_threshold, 0.1);
        assert_eq!(cfg.perp_diff_threshold, 0.2);
        assert!(cfg.use_public_data_only);
        assert_eq!(cfg.exchange_volume_thresholds.get("binance"), Some(&20_000_000.0));
        assert_eq!(cfg.exchange_volume_thresholds.get("gate"), Some(&5_000_000.0));
    }

    #[test]
    fn window_capacity_floors_at_1000() {
        let mut cfg = AppConfig::default();
        cfg.lookback_minutes = 5;
        assert_eq!(cfg.window_capacity(), 1000);
        cfg.lookback_minutes = 5000;
        assert_eq!(cfg.window_capacity(), 5000);
    }

    #[test]
    fn parses_volume_threshold_map() {
        let parsed = parse_volume_thresholds("binance:20000000,gate:5000000").unwrap();
        assert_eq!(parsed.get("binance"), Some(&20_000_000.0));
        assert_eq!(parsed.get("gate"), Some(&5_000_000.0));
    }

    #[test]
    fn basis_direction_defaults_to_both_on_unknown_value() {
        let parsed: BasisDirectionFilter = "nonsense".parse().unwrap();
        assert_eq!(parsed, BasisDirectionFilter::Both);
    }
}
