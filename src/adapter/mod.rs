//! Exchange Adapter Facade (§4.1).
//!
//! A uniform interface over per-venue client objects. This is the seam named
//! explicitly out of scope by the specification ("a black box... §6 describes
//! only their contracts") — the trait below *is* that contract. Concrete
//! venue clients are thin, using `reqwest` for REST and `tokio-tungstenite`
//! for streaming, matching the teacher's stack (`scrapers::binance_session`,
//! `scrapers::dome_websocket`).
//!
//! No reflection: a venue id is resolved to a constructor through the
//! `registry` function below, never through string-based dynamic dispatch
//! (§9 design note).

pub mod binance;
pub mod bybit;
pub mod error;
pub mod gate;
pub mod okx;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::{Bar, MarketMeta, Ticker};

pub use error::{classify, AdapterErrorKind};

/// A long-lived cursor over a single symbol's OHLCV stream. Each call to
/// `advance` yields the latest candle of the subscribed stream (§4.1).
#[async_trait]
pub trait OhlcvCursor: Send {
    async fn advance(&mut self) -> anyhow::Result<Bar>;
}

/// A long-lived cursor over a single symbol's ticker stream.
#[async_trait]
pub trait TickerCursor: Send {
    async fn advance(&mut self) -> anyhow::Result<Ticker>;
}

/// The contract the core consumes from each venue (§4.1).
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Stable identifier for this venue, e.g. "binance".
    fn venue_id(&self) -> &str;

    async fn load_markets(&self) -> anyhow::Result<HashMap<String, MarketMeta>>;

    async fn watch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Box<dyn OhlcvCursor>>;

    async fn watch_ticker(&self, symbol: &str) -> anyhow::Result<Box<dyn TickerCursor>>;

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<Bar>>;

    /// Releases network resources. Must tolerate being awaited concurrently
    /// with outstanding cursors (§4.1).
    async fn close(&self) -> anyhow::Result<()>;
}

/// Optional credentials forwarded to an adapter only when
/// `USE_PUBLIC_DATA_ONLY=false` (§6).
#[derive(Debug, Clone, Default)]
pub struct VenueCredentials {
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub password: Option<String>,
}

/// Builds the concrete adapter for a venue id. No reflection: every venue
/// this binary supports is listed explicitly here.
pub fn build_adapter(
    venue_id: &str,
    credentials: Option<VenueCredentials>,
    request_timeout_secs: u64,
) -> anyhow::Result<Box<dyn ExchangeAdapter>> {
    match venue_id {
        "binance" => Ok(Box::new(binance::BinanceAdapter::new(
            credentials,
            request_timeout_secs,
        )?)),
        "okx" => Ok(Box::new(okx::OkxAdapter::new(credentials, request_timeout_secs)?)),
        "bybit" => Ok(Box::new(bybit::BybitAdapter::new(credentials, request_timeout_secs)?)),
        "gate" => Ok(Box::new(gate::GateAdapter::new(credentials, request_timeout_secs)?)),
        other => anyhow::bail!("no adapter registered for venue '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_venue_is_rejected() {
        let result = build_adapter("not-a-real-venue", None, 30);
        assert!(result.is_err());
    }

    #[test]
    fn known_venues_build() {
        for venue in ["binance", "okx", "bybit", "gate"] {
            assert!(build_adapter(venue, None, 30).is_ok(), "venue {venue} should build");
        }
    }
}
