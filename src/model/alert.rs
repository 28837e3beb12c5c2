//! The discriminated alert record emitted by all three detectors (§3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Volatility,
    Basis,
    CrossExchange,
}

impl AlertKind {
    /// Default cooldown TTL in seconds, per §3 ("Cooldown Map").
    pub fn default_ttl_secs(&self) -> u64 {
        match self {
            AlertKind::Volatility => 3600,
            AlertKind::Basis => 300,
            AlertKind::CrossExchange => 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityPayload {
    pub venue: String,
    pub symbol: String,
    pub current_price: f64,
    pub reference_price: f64,
    pub price_change_pct: f64,
    pub current_volume: f64,
    pub average_volume: f64,
    pub volume_ratio: f64,
    /// Advisory only — never gates emission (§4.5, Open Question 4).
    pub price_percentile: Option<f64>,
    pub thirty_day_high: Option<f64>,
    pub thirty_day_low: Option<f64>,
    pub thirty_day_avg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisDirection {
    Premium,
    Discount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisPayload {
    pub venue: String,
    pub spot_symbol: String,
    pub future_symbol: String,
    pub spot_price: f64,
    pub future_price: f64,
    pub price_difference_percent: f64,
    pub direction: BasisDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossExchangePayload {
    pub canonical_base: String,
    pub higher_venue: String,
    pub lower_venue: String,
    pub higher_price: f64,
    pub lower_price: f64,
    pub volume_a: f64,
    pub volume_b: f64,
    pub spread_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertPayload {
    Volatility(VolatilityPayload),
    Basis(BasisPayload),
    CrossExchange(CrossExchangePayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub detected_at: DateTime<Utc>,
    pub dedup_key: String,
    pub payload: AlertPayload,
}

impl Alert {
    pub fn volatility(dedup_key: String, payload: VolatilityPayload) -> Self {
        Self {
            kind: AlertKind::Volatility,
            detected_at: Utc::now(),
            dedup_key,
            payload: AlertPayload::Volatility(payload),
        }
    }

    pub fn basis(dedup_key: String, payload: BasisPayload) -> Self {
        Self {
            kind: AlertKind::Basis,
            detected_at: Utc::now(),
            dedup_key,
            payload: AlertPayload::Basis(payload),
        }
    }

    pub fn cross_exchange(dedup_key: String, payload: CrossExchangePayload) -> Self {
        Self {
            kind: AlertKind::CrossExchange,
            detected_at: Utc::now(),
            dedup_key,
            payload: AlertPayload::CrossExchange(payload),
        }
    }
}
