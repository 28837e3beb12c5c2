//! Gate.io adapter: spot + USDT perpetual markets over REST + WebSocket v4.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::model::{Bar, MarketMeta, Ticker};

use super::{ExchangeAdapter, OhlcvCursor, TickerCursor, VenueCredentials};

const SPOT_REST_BASE: &str = "https://api.gateio.ws/api/v4";
const FUTURES_REST_BASE: &str = "https://api.gateio.ws/api/v4";
const SPOT_WS: &str = "wss://api.gateio.ws/ws/v4/";
const FUTURES_WS: &str = "wss://fx-ws.gateio.ws/v4/ws/usdt";

pub struct GateAdapter {
    http: Client,
    #[allow(dead_code)]
    credentials: Option<VenueCredentials>,
}

impl GateAdapter {
    pub fn new(credentials: Option<VenueCredentials>, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("market-radar/1.0")
            .build()?;
        Ok(Self { http, credentials })
    }
}

#[derive(Debug, Deserialize)]
struct GateSpotPair {
    id: String,
    base: String,
    quote: String,
    #[serde(rename = "trade_status")]
    trade_status: String,
}

#[derive(Debug, Deserialize)]
struct GateFuturesContract {
    name: String,
    #[serde(default)]
    in_delisting: bool,
}

/// Gate wire symbols use `_` (e.g. `BTC_USDT`); our canonical shape uses `/`.
fn wire_symbol(symbol: &str) -> (String, bool) {
    if let Some((pair, _)) = symbol.split_once(':') {
        (pair.replace('/', "_").to_uppercase(), true)
    } else {
        (symbol.replace('/', "_").to_uppercase(), false)
    }
}

#[async_trait]
impl ExchangeAdapter for GateAdapter {
    fn venue_id(&self) -> &str {
        "gate"
    }

    async fn load_markets(&self) -> anyhow::Result<HashMap<String, MarketMeta>> {
        let mut out = HashMap::new();

        let spot: Vec<GateSpotPair> = self
            .http
            .get(format!("{SPOT_REST_BASE}/spot/currency_pairs"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        for pair in spot {
            out.insert(
                format!("{}/{}", pair.base, pair.quote),
                MarketMeta {
                    active: pair.trade_status == "tradable",
                    base: pair.base,
                    quote: pair.quote,
                    is_swap: false,
                    is_future: false,
                },
            );
        }

        let futures: Vec<GateFuturesContract> = self
            .http
            .get(format!("{FUTURES_REST_BASE}/futures/usdt/contracts"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        for contract in futures {
            let Some(base) = contract.name.strip_suffix("_USDT") else { continue };
            out.insert(
                format!("{base}/USDT:USDT"),
                MarketMeta {
                    active: !contract.in_delisting,
                    base: base.to_string(),
                    quote: "USDT".to_string(),
                    is_swap: true,
                    is_future: false,
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
        let (wire, is_future) = wire_symbol(symbol);
        let url = if is_future { FUTURES_WS } else { SPOT_WS };
        let (socket, _) = connect_async(url).await?;
        let mut cursor = GateKlineCursor { socket };
        let channel = if is_future { "futures.candlesticks" } else { "spot.candlesticks" };
        cursor.subscribe(channel, vec![timeframe.to_string(), wire]).await?;
        Ok(Box::new(cursor))
    }

    async fn watch_ticker(&self, symbol: &str) -> anyhow::Result<Box<dyn TickerCursor>> {
        let (wire, is_future) = wire_symbol(symbol);
        let url = if is_future { FUTURES_WS } else { SPOT_WS };
        let (socket, _) = connect_async(url).await?;
        let mut cursor = GateTickerCursor { socket };
        let channel = if is_future { "futures.tickers" } else { "spot.tickers" };
        cursor.subscribe(channel, vec![wire]).await?;
        Ok(Box::new(cursor))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<Bar>> {
        let (wire, is_future) = wire_symbol(symbol);
        let since_s = since_ms / 1000;
        let url = if is_future {
            format!(
                "{FUTURES_REST_BASE}/futures/usdt/candlesticks?contract={wire}&interval={timeframe}&from={since_s}&limit={limit}"
            )
        } else {
            format!(
                "{SPOT_REST_BASE}/spot/candlesticks?currency_pair={wire}&interval={timeframe}&from={since_s}&limit={limit}"
            )
        };
        let rows: Vec<serde_json::Value> =
            self.http.get(url).send().await?.error_for_status()?.json().await?;

        rows.iter()
            .map(|row| {
                let arr = row.as_array().ok_or_else(|| anyhow::anyhow!("bad candle row"))?;
                anyhow::ensure!(arr.len() >= 6, "candle row too short");
                let f = |i: usize| -> anyhow::Result<f64> {
                    arr[i]
                        .as_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| anyhow::anyhow!("bad numeric candle field"))
                };
                Ok(Bar {
                    ts_ms: arr[0].as_str().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0) * 1000,
                    volume: f(1)?,
                    close: f(2)?,
                    high: f(3)?,
                    low: f(4)?,
                    open: f(5)?,
                })
            })
            .collect()
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct GateKlineCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl GateKlineCursor {
    async fn subscribe(&mut self, channel: &str, payload: Vec<String>) -> anyhow::Result<()> {
        let sub = serde_json::json!({
            "time": 0,
            "channel": channel,
            "event": "subscribe",
            "payload": payload,
        });
        self.socket.send(Message::Text(sub.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl OhlcvCursor for GateKlineCursor {
    async fn advance(&mut self) -> anyhow::Result<Bar> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("gate candle stream closed"))??;
            let Message::Text(text) = msg else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            let Some(result) = value.get("result") else { continue };
            let get = |k: &str| -> f64 {
                result.get(k).and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0)
            };
            let ts = result
                .get("t")
                .and_then(|v| v.as_str().and_then(|s| s.parse::<i64>().ok()).or_else(|| v.as_i64()))
                .unwrap_or(0);
            return Ok(Bar {
                ts_ms: ts * 1000,
                open: get("o"),
                high: get("h"),
                low: get("l"),
                close: get("c"),
                volume: get("v"),
            });
        }
    }
}

struct GateTickerCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl GateTickerCursor {
    async fn subscribe(&mut self, channel: &str, payload: Vec<String>) -> anyhow::Result<()> {
        let sub = serde_json::json!({
            "time": 0,
            "channel": channel,
            "event": "subscribe",
            "payload": payload,
        });
        self.socket.send(Message::Text(sub.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl TickerCursor for GateTickerCursor {
    async fn advance(&mut self) -> anyhow::Result<Ticker> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("gate ticker stream closed"))??;
            let Message::Text(text) = msg else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            let Some(result) = value.get("result") else { continue };
            let get = |k: &str| -> f64 {
                result.get(k).and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0)
            };
            return Ok(Ticker {
                bid: get("highest_bid"),
                ask: get("lowest_ask"),
                last: get("last"),
                base_volume_24h: get("base_volume"),
                quote_volume_24h: get("quote_volume"),
                ts_ms: value.get("time_ms").and_then(|v| v.as_i64()).unwrap_or(0),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_uses_underscore_separator() {
        assert_eq!(wire_symbol("BTC/USDT:USDT"), ("BTC_USDT".to_string(), true));
        assert_eq!(wire_symbol("BTC/USDT"), ("BTC_USDT".to_string(), false));
    }
}
