//! Market Anomaly Radar — entrypoint.
//!
//! Loads configuration (environment + CLI overrides), builds one adapter
//! per configured venue, wires up the catalog/store/supervisor/detector
//! stack, and runs until `Ctrl+C` or `SIGTERM`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_radar::adapter::{build_adapter, ExchangeAdapter};
use market_radar::catalog::{Blacklist, SymbolCatalog};
use market_radar::config::AppConfig;
use market_radar::coordinator::Coordinator;
use market_radar::model::VenueId;
use market_radar::notifier::{Notifier, WebhookNotifier};
use market_radar::store::MarketStateStore;

/// CLI flags override the environment-derived configuration (§6: "flags
/// override the configuration above").
#[derive(Debug, Parser)]
#[command(name = "market-radar", about = "Cryptocurrency market anomaly radar")]
struct Cli {
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[arg(long)]
    exchanges: Option<String>,

    #[arg(long)]
    perp_exchanges: Option<String>,

    #[arg(long)]
    scan_interval_seconds: Option<u64>,

    #[arg(long)]
    webhook_url: Option<String>,

    #[arg(long)]
    webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "error",
        }
    }
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("market_radar={}", level.as_filter()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_adapters(config: &AppConfig) -> HashMap<VenueId, Arc<dyn ExchangeAdapter>> {
    let mut venues: Vec<String> = config.exchanges.clone();
    for v in &config.perp_exchanges {
        if !venues.contains(v) {
            venues.push(v.clone());
        }
    }

    let mut adapters = HashMap::new();
    for venue_id in venues {
        match build_adapter(&venue_id, None, config.request_timeout_seconds) {
            Ok(adapter) => {
                adapters.insert(VenueId::from(venue_id.as_str()), Arc::from(adapter));
            }
            Err(err) => {
                warn!(venue = %venue_id, error = %err, "failed to build adapter, venue dropped");
            }
        }
    }
    adapters
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let mut config = AppConfig::from_env();
    if let Some(exchanges) = cli.exchanges {
        config.exchanges = exchanges.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(perp_exchanges) = cli.perp_exchanges {
        config.perp_exchanges = perp_exchanges.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(interval) = cli.scan_interval_seconds {
        config.scan_interval_seconds = interval;
    }
    let config = Arc::new(config);

    info!(exchanges = ?config.exchanges, perp_exchanges = ?config.perp_exchanges, "starting market radar");

    let adapters = build_adapters(&config);
    if adapters.is_empty() {
        anyhow::bail!("no exchange adapters could be built; nothing to do");
    }

    let catalog = Arc::new(SymbolCatalog::new(Blacklist::new(config.perp_blacklist.clone())));
    let store = Arc::new(MarketStateStore::new(config.window_capacity()));

    let webhook_url = cli
        .webhook_url
        .or_else(|| std::env::var("NOTIFIER_WEBHOOK_URL").ok())
        .context("NOTIFIER_WEBHOOK_URL must be set (or pass --webhook-url)")?;
    let webhook_secret = cli.webhook_secret.or_else(|| std::env::var("NOTIFIER_WEBHOOK_SECRET").ok());
    let notifier: Arc<dyn Notifier> =
        Arc::new(WebhookNotifier::new(webhook_url, webhook_secret, config.request_timeout_seconds)?);

    let cancel = CancellationToken::new();
    let coordinator =
        Coordinator::new(config.clone(), catalog, store, adapters, notifier, cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to install ctrl-c handler");
                return;
            }
            info!("ctrl-c received, shutting down");
            cancel.cancel();
        }
    });

    coordinator.run().await;

    info!("market radar exited cleanly");
    Ok(())
}
