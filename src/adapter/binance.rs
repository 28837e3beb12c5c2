//! Binance adapter: spot + USDT-M perpetual markets over REST + WebSocket.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::model::{Bar, MarketMeta, Ticker};

use super::{ExchangeAdapter, OhlcvCursor, TickerCursor, VenueCredentials};

const SPOT_REST_BASE: &str = "https://api.binance.com";
const FUTURES_REST_BASE: &str = "https://fapi.binance.com";
const SPOT_WS_BASE: &str = "wss://stream.binance.com:9443/ws";
const FUTURES_WS_BASE: &str = "wss://fstream.binance.com/ws";

pub struct BinanceAdapter {
    http: Client,
    #[allow(dead_code)]
    credentials: Option<VenueCredentials>,
}

impl BinanceAdapter {
    pub fn new(credentials: Option<VenueCredentials>, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("market-radar/1.0")
            .build()?;
        Ok(Self { http, credentials })
    }
}

#[derive(Debug, Deserialize)]
struct SpotExchangeInfo {
    symbols: Vec<SpotSymbol>,
}

#[derive(Debug, Deserialize)]
struct SpotSymbol {
    symbol: String,
    status: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct FuturesExchangeInfo {
    symbols: Vec<FuturesSymbol>,
}

#[derive(Debug, Deserialize)]
struct FuturesSymbol {
    symbol: String,
    status: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(rename = "contractType")]
    contract_type: String,
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn venue_id(&self) -> &str {
        "binance"
    }

    async fn load_markets(&self) -> anyhow::Result<HashMap<String, MarketMeta>> {
        let mut out = HashMap::new();

        let spot: SpotExchangeInfo = self
            .http
            .get(format!("{SPOT_REST_BASE}/api/v3/exchangeInfo"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        for s in spot.symbols {
            out.insert(
                format!("{}/{}", s.base_asset, s.quote_asset),
                MarketMeta {
                    active: s.status == "TRADING",
                    base: s.base_asset,
                    quote: s.quote_asset,
                    is_swap: false,
                    is_future: false,
                },
            );
        }

        let futures: FuturesExchangeInfo = self
            .http
            .get(format!("{FUTURES_REST_BASE}/fapi/v1/exchangeInfo"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        for s in futures.symbols {
            let is_perpetual = s.contract_type == "PERPETUAL";
            out.insert(
                format!("{}/{}:{}", s.base_asset, s.quote_asset, s.quote_asset),
                MarketMeta {
                    active: s.status == "TRADING",
                    base: s.base_asset,
                    quote: s.quote_asset,
                    is_swap: is_perpetual,
                    is_future: !is_perpetual,
                },
            );
        }

        Ok(out)
    }

    async fn watch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Box<dyn OhlcvCursor>> {
        let (ws_base, wire_symbol) = ws_endpoint(symbol);
        let stream = format!("{}@kline_{}", wire_symbol.to_lowercase(), timeframe);
        let url = format!("{ws_base}/{stream}");
        let (socket, _) = connect_async(url).await?;
        Ok(Box::new(BinanceKlineCursor { socket }))
    }

    async fn watch_ticker(&self, symbol: &str) -> anyhow::Result<Box<dyn TickerCursor>> {
        let (ws_base, wire_symbol) = ws_endpoint(symbol);
        let stream = format!("{}@ticker", wire_symbol.to_lowercase());
        let url = format!("{ws_base}/{stream}");
        let (socket, _) = connect_async(url).await?;
        Ok(Box::new(BinanceTickerCursor { socket }))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<Bar>> {
        let (rest_base, wire_symbol, path) = rest_endpoint(symbol);
        let url = format!(
            "{rest_base}{path}?symbol={wire_symbol}&interval={timeframe}&startTime={since_ms}&limit={limit}"
        );
        let raw: Vec<Vec<serde_json::Value>> =
            self.http.get(url).send().await?.error_for_status()?.json().await?;

        raw.iter().map(parse_kline_row).collect()
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Perpetuals are wire-formatted as `BTC/USDT:USDT`; strip the venue marker
/// to get Binance's flat `BTCUSDT` wire symbol, and pick the matching
/// REST/WS base.
fn wire_symbol(symbol: &str) -> (String, bool) {
    if let Some((pair, _)) = symbol.split_once(':') {
        (pair.replace('/', "").to_uppercase(), true)
    } else {
        (symbol.replace('/', "").to_uppercase(), false)
    }
}

fn ws_endpoint(symbol: &str) -> (&'static str, String) {
    let (wire, is_future) = wire_symbol(symbol);
    if is_future {
        (FUTURES_WS_BASE, wire)
    } else {
        (SPOT_WS_BASE, wire)
    }
}

fn rest_endpoint(symbol: &str) -> (&'static str, String, &'static str) {
    let (wire, is_future) = wire_symbol(symbol);
    if is_future {
        (FUTURES_REST_BASE, wire, "/fapi/v1/klines")
    } else {
        (SPOT_REST_BASE, wire, "/api/v3/klines")
    }
}

fn parse_kline_row(row: &Vec<serde_json::Value>) -> anyhow::Result<Bar> {
    anyhow::ensure!(row.len() >= 6, "kline row has fewer than 6 fields");
    let ts_ms = row[0].as_i64().ok_or_else(|| anyhow::anyhow!("bad timestamp"))?;
    let parse_f64 = |v: &serde_json::Value| -> anyhow::Result<f64> {
        v.as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("bad numeric kline field"))
    };
    Ok(Bar {
        ts_ms,
        open: parse_f64(&row[1])?,
        high: parse_f64(&row[2])?,
        low: parse_f64(&row[3])?,
        close: parse_f64(&row[4])?,
        volume: parse_f64(&row[5])?,
    })
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    k: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    t: i64,
    #[serde(deserialize_with = "de_f64_str")]
    o: f64,
    #[serde(deserialize_with = "de_f64_str")]
    h: f64,
    #[serde(deserialize_with = "de_f64_str")]
    l: f64,
    #[serde(deserialize_with = "de_f64_str")]
    c: f64,
    #[serde(deserialize_with = "de_f64_str")]
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TickerEvent {
    b: String,
    a: String,
    c: String,
    v: String,
    q: String,
    #[serde(rename = "E")]
    event_time: i64,
}

fn de_f64_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

struct BinanceKlineCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl OhlcvCursor for BinanceKlineCursor {
    async fn advance(&mut self) -> anyhow::Result<Bar> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("binance kline stream closed"))??;
            match msg {
                Message::Text(text) => {
                    let Ok(event) = serde_json::from_str::<KlineEvent>(&text) else {
                        continue;
                    };
                    return Ok(Bar {
                        ts_ms: event.k.t,
                        open: event.k.o,
                        high: event.k.h,
                        low: event.k.l,
                        close: event.k.c,
                        volume: event.k.v,
                    });
                }
                Message::Ping(payload) => {
                    self.socket.send(Message::Pong(payload)).await?;
                }
                Message::Close(_) => anyhow::bail!("binance kline stream closed by server"),
                _ => continue,
            }
        }
    }
}

struct BinanceTickerCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl TickerCursor for BinanceTickerCursor {
    async fn advance(&mut self) -> anyhow::Result<Ticker> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("binance ticker stream closed"))??;
            match msg {
                Message::Text(text) => {
                    let Ok(event) = serde_json::from_str::<TickerEvent>(&text) else {
                        continue;
                    };
                    return Ok(Ticker {
                        bid: event.b.parse().unwrap_or(0.0),
                        ask: event.a.parse().unwrap_or(0.0),
                        last: event.c.parse().unwrap_or(0.0),
                        base_volume_24h: event.v.parse().unwrap_or(0.0),
                        quote_volume_24h: event.q.parse().unwrap_or(0.0),
                        ts_ms: event.event_time,
                    });
                }
                Message::Ping(payload) => {
                    self.socket.send(Message::Pong(payload)).await?;
                }
                Message::Close(_) => anyhow::bail!("binance ticker stream closed by server"),
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_strips_perpetual_marker() {
        assert_eq!(wire_symbol("BTC/USDT:USDT"), ("BTCUSDT".to_string(), true));
        assert_eq!(wire_symbol("BTC/USDT"), ("BTCUSDT".to_string(), false));
    }

    #[test]
    fn parse_kline_row_reads_string_and_numeric_fields() {
        let row = vec![
            serde_json::json!(1_000_i64),
            serde_json::json!("100.0"),
            serde_json::json!("105.0"),
            serde_json::json!("99.0"),
            serde_json::json!("103.0"),
            serde_json::json!("60.0"),
        ];
        let bar = parse_kline_row(&row).unwrap();
        assert_eq!(bar.ts_ms, 1_000);
        assert_eq!(bar.close, 103.0);
        assert_eq!(bar.volume, 60.0);
    }
}
