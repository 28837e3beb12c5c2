//! OKX adapter: spot + USDT-margined perpetual swaps over REST + WebSocket v5.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::model::{Bar, MarketMeta, Ticker};

use super::{ExchangeAdapter, OhlcvCursor, TickerCursor, VenueCredentials};

const REST_BASE: &str = "https://www.okx.com";
const WS_BUSINESS: &str = "wss://ws.okx.com:8443/ws/v5/business";
const WS_PUBLIC: &str = "wss://ws.okx.com:8443/ws/v5/public";

pub struct OkxAdapter {
    http: Client,
    #[allow(dead_code)]
    credentials: Option<VenueCredentials>,
}

impl OkxAdapter {
    pub fn new(credentials: Option<VenueCredentials>, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("market-radar/1.0")
            .build()?;
        Ok(Self { http, credentials })
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    data: Vec<OkxInstrument>,
}

#[derive(Debug, Deserialize)]
struct OkxInstrument {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "instType")]
    inst_type: String,
    #[serde(rename = "baseCcy", default)]
    base_ccy: String,
    #[serde(rename = "quoteCcy", default)]
    quote_ccy: String,
    #[serde(rename = "state")]
    state: String,
}

/// `BTC-USDT` (spot) or `BTC-USDT-SWAP` (perpetual) to our `BTC/USDT[:USDT]`
/// symbol shape, and back.
fn to_canonical_symbol(inst: &OkxInstrument) -> String {
    if inst.inst_type == "SWAP" {
        let base = inst.inst_id.trim_end_matches("-USDT-SWAP");
        format!("{base}/USDT:USDT")
    } else {
        format!("{}/{}", inst.base_ccy, inst.quote_ccy)
    }
}

fn to_inst_id(symbol: &str) -> String {
    if let Some((pair, _)) = symbol.split_once(':') {
        format!("{}-SWAP", pair.replace('/', "-"))
    } else {
        symbol.replace('/', "-")
    }
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn venue_id(&self) -> &str {
        "okx"
    }

    async fn load_markets(&self) -> anyhow::Result<HashMap<String, MarketMeta>> {
        let mut out = HashMap::new();
        for inst_type in ["SPOT", "SWAP"] {
            let resp: InstrumentsResponse = self
                .http
                .get(format!("{REST_BASE}/api/v5/public/instruments?instType={inst_type}"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            for inst in resp.data {
                let is_swap = inst.inst_type == "SWAP";
                let (base, quote) = if is_swap {
                    let base = inst.inst_id.trim_end_matches("-USDT-SWAP").to_string();
                    (base, "USDT".to_string())
                } else {
                    (inst.base_ccy.clone(), inst.quote_ccy.clone())
                };
                out.insert(
                    to_canonical_symbol(&inst),
                    MarketMeta {
                        active: inst.state == "live",
                        base,
                        quote,
                        is_swap,
                        is_future: false,
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
        let (socket, _) = connect_async(WS_BUSINESS).await?;
        let mut cursor = OkxKlineCursor { socket };
        let channel = format!("candle{}", okx_bar_interval(timeframe));
        cursor.subscribe(&channel, &to_inst_id(symbol)).await?;
        Ok(Box::new(cursor))
    }

    async fn watch_ticker(&self, symbol: &str) -> anyhow::Result<Box<dyn TickerCursor>> {
        let (socket, _) = connect_async(WS_PUBLIC).await?;
        let mut cursor = OkxTickerCursor { socket };
        cursor.subscribe("tickers", &to_inst_id(symbol)).await?;
        Ok(Box::new(cursor))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<Bar>> {
        let inst_id = to_inst_id(symbol);
        let bar = okx_bar_interval(timeframe);
        let url = format!(
            "{REST_BASE}/api/v5/market/history-candles?instId={inst_id}&bar={bar}&after={since_ms}&limit={limit}"
        );
        let resp: serde_json::Value = self.http.get(url).send().await?.error_for_status()?.json().await?;
        let rows = resp
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("missing data array in OKX candles response"))?;

        rows.iter()
            .map(|row| {
                let row = row.as_array().ok_or_else(|| anyhow::anyhow!("bad candle row"))?;
                anyhow::ensure!(row.len() >= 6, "candle row too short");
                let f = |i: usize| -> anyhow::Result<f64> {
                    row[i]
                        .as_str()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| anyhow::anyhow!("bad numeric candle field"))
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

fn okx_bar_interval(timeframe: &str) -> String {
    match timeframe {
        "1m" => "1m".to_string(),
        other => other.to_string(),
    }
}

struct OkxKlineCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl OkxKlineCursor {
    async fn subscribe(&mut self, channel: &str, inst_id: &str) -> anyhow::Result<()> {
        let sub = serde_json::json!({
            "op": "subscribe",
            "args": [{"channel": channel, "instId": inst_id}],
        });
        self.socket.send(Message::Text(sub.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl OhlcvCursor for OkxKlineCursor {
    async fn advance(&mut self) -> anyhow::Result<Bar> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("okx candle stream closed"))??;
            let Message::Text(text) = msg else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            let Some(rows) = value.get("data").and_then(|d| d.as_array()) else { continue };
            let Some(row) = rows.first().and_then(|r| r.as_array()) else { continue };
            if row.len() < 6 {
                continue;
            }
            let f = |i: usize| row[i].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            return Ok(Bar {
                ts_ms: row[0].as_str().and_then(|s| s.parse().ok()).unwrap_or(0),
                open: f(1),
                high: f(2),
                low: f(3),
                close: f(4),
                volume: f(5),
            });
        }
    }
}

struct OkxTickerCursor {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl OkxTickerCursor {
    async fn subscribe(&mut self, channel: &str, inst_id: &str) -> anyhow::Result<()> {
        let sub = serde_json::json!({
            "op": "subscribe",
            "args": [{"channel": channel, "instId": inst_id}],
        });
        self.socket.send(Message::Text(sub.to_string())).await?;
        Ok(())
    }
}

#[async_trait]
impl TickerCursor for OkxTickerCursor {
    async fn advance(&mut self) -> anyhow::Result<Ticker> {
        loop {
            let msg = self
                .socket
                .next()
                .await
                .ok_or_else(|| anyhow::anyhow!("okx ticker stream closed"))??;
            let Message::Text(text) = msg else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            let Some(rows) = value.get("data").and_then(|d| d.as_array()) else { continue };
            let Some(row) = rows.first() else { continue };
            let get = |k: &str| -> f64 {
                row.get(k).and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0)
            };
            return Ok(Ticker {
                bid: get("bidPx"),
                ask: get("askPx"),
                last: get("last"),
                base_volume_24h: get("vol24h"),
                quote_volume_24h: get("volCcy24h"),
                ts_ms: row.get("ts").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inst_id_round_trips_for_perpetual() {
        assert_eq!(to_inst_id("BTC/USDT:USDT"), "BTC-USDT-SWAP");
        assert_eq!(to_inst_id("BTC/USDT"), "BTC-USDT");
    }
}
