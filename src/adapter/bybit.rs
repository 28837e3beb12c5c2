//! Bybit adapter: spot + USDT perpetual markets over REST + WebSocket v5.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::model::{Bar, MarketMeta, Ticker};

use super::{ExchangeAdapter, OhlcvCursor, TickerCursor, VenueCredentials};

const REST_BASE: &str = "https://api.bybit.com";
const WS_SPOT: &str = "wss://stream.bybit.com/v5/public/spot";
const WS_LINEAR: &str = "wss://stream.bybit.com/v5/public/linear";

pub struct BybitAdapter {
    http: Client,
    #[allow(dead_code)]
    credentials: Option<VenueCredentials>,
}

impl BybitAdapter {
    pub fn new(credentials: Option<VenueCredentials>, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("market-radar/1.0")
            .build()?;
        Ok(Self { http, credentials })
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentsInfoResponse {
    result: InstrumentsInfoResult,
}

#[derive(Debug, Deserialize)]
struct InstrumentsInfoResult {
    list: Vec<BybitInstrument>,
}

#[derive(Debug, Deserialize)]
struct BybitInstrument {
    symbol: String,
    status: String,
    #[serde(rename = "baseCoin")]
    base_coin: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
    #[serde(rename = "contractType", default)]
    contract_type: String,
}

fn wire_symbol(symbol: &str) -> (String, bool) {
    if let Some((pair, _)) = symbol.split_once(':') {
        (pair.replace('/', "").to_uppercase(), true)
    } else {
        (symbol.replace('/', "").to_uppercase(), false)
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn venue_id(&self) -> &str {
        "bybit"
    }

    async fn load_markets(&self) -> anyhow::Result<HashMap<String, MarketMeta>> {
        let mut out = HashMap::new();
        for (category, is_swap) in [("spot", false), ("linear", true)] {
            let resp: InstrumentsInfoResponse = self
                .http
                .get(format!("{REST_BASE}/v5/market/instruments-info?category={category}"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            for inst in resp.result.list {
                let is_perpetual = !is_swap || inst.contract_type == "LinearPerpetual";
                let symbol = if is_swap {
                    format!("{}/{}:{}", inst.base_coin, inst.quote_coin, inst.quote_coin)
                } else {
                    format!("{}/{}", inst.base_coin, inst.quote_coin)
                };
                out.insert(
                    symbol,
                    MarketMeta {
                        active: inst.status == "Trading",
                        base: inst.base_coin,
                        quote: inst.quote_coin,
                        is_swap: is_swap && is_perpetual,
                        is_future: is_swap && !is_perpetual,
                    },
                );
            }
        }
        Ok(out)
    }

    async fn watch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Box<dyn OhlcvCursor>> {
        let (wire, is_future) = wire_symbol(symbol);
        let url = if is_future { WS_LINEAR } else { WS_SPOT };
        let (socket, _) = connect_async(url).await?;
        let mut cursor = BybitKlineCursor { socket };
        let interval = bybit_interval(timeframe);
        cursor.subscribe(&format!("kline.{interval}.{wire}")).await?;
        Ok(Box::new(cursor))
    }

    async fn watch_ticker(&self, symbol: &str) -> anyhow::Result<Box<dyn TickerCursor>> {
        let (wire, is_future) = wire_symbol(symbol);
        let url = if is_future { WS_LINEAR } else { WS_SPOT };
        let (socket, _) = connect_async(url).await?;
        let mut cursor = BybitTickerCursor { socket };
        cursor.subscribe(&format!("tickers.{wire}")).await?;
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
        let category = if is_future { "linear" } else { "spot" };
        let interval = bybit_interval(timeframe);
        let url = format!(
            "{REST_BASE}/v5/market/kline?category={category}&symbol={wire}&interval={interval}&start={since_ms}&limit={limit}"
        );
        let resp: serde_json::Value = self.http.get(url).send().await?.error_for_status()?.json().await?;
        let rows = resp
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(|l| l.as_array())
            .ok_or_else(|| anyhow::anyhow!("missing result.list in bybit kline response"))?;

        rows.iter()
            .map(|row| {
                let row = row.as_array().ok_or_else(|| anyhow::anyhow!("bad kline row"))?;
                anyhow::ensure!(row.len() >= 6, "kline row too short");
                let f = |i: usize| -> anyhow::Result<f64> {
                    row[i]
                        .as_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| anyhow::anyhow!("bad numeric kline field"))
                };
                Ok(Bar {
                    ts_ms: row[0].as_str().and_then(|s| s.parse().ok()).unwrap_or(0),
                    open: f(1)?,
                    high: f(2)?,
                    low: f(3)?,
                    close: f(4)?,
                    volume: f(5)?,
                })
            })
            .collect()
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn bybit_interval(timeframe: &str) -> String {
    match timeframe {
        "1m" => "1".to_string(),
        other => other.trim_end_matches('m').to_string(),
    }
}

struct BybitKlineCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl BybitKlineCursor {
    async fn subscribe(&mut self, topic: &str) -> anyhow::Result<()> {
        let sub = serde_json::json!({"op": "subscribe", "args": [topic]});
        self.socket.send(Message::Text(sub.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl OhlcvCursor for BybitKlineCursor {
    async fn advance(&mut self) -> anyhow::Result<Bar> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("bybit kline stream closed"))??;
            let Message::Text(text) = msg else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            let Some(rows) = value.get("data").and_then(|d| d.as_array()) else { continue };
            let Some(row) = rows.first() else { continue };
            let get = |k: &str| -> f64 {
                row.get(k).and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0)
            };
            return Ok(Bar {
                ts_ms: row.get("start").and_then(|v| v.as_i64()).unwrap_or(0),
                open: get("open"),
                high: get("high"),
                low: get("low"),
                close: get("close"),
                volume: get("volume"),
            });
        }
    }
}

struct BybitTickerCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl BybitTickerCursor {
    async fn subscribe(&mut self, topic: &str) -> anyhow::Result<()> {
        let sub = serde_json::json!({"op": "subscribe", "args": [topic]});
        self.socket.send(Message::Text(sub.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl TickerCursor for BybitTickerCursor {
    async fn advance(&mut self) -> anyhow::Result<Ticker> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("bybit ticker stream closed"))??;
            let Message::Text(text) = msg else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            let Some(row) = value.get("data") else { continue };
            let get = |k: &str| -> f64 {
                row.get(k).and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0)
            };
            return Ok(Ticker {
                bid: get("bid1Price"),
                ask: get("ask1Price"),
                last: get("lastPrice"),
                base_volume_24h: get("volume24h"),
                quote_volume_24h: get("turnover24h"),
                ts_ms: value.get("ts").and_then(|v| v.as_i64()).unwrap_or(0),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bybit_interval_maps_1m_to_1() {
        assert_eq!(bybit_interval("1m"), "1");
    }
}
