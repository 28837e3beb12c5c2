//! Notifier contract (§6: "Notification transport ... out of scope; §4
//! describes only its contract"). The core only needs to hand a batch of
//! same-kind alerts to something that accepts them; this module supplies
//! the one concrete implementation (a signed webhook) the rest of the
//! pipeline is tested against.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::warn;

use crate::error::AppError;
use crate::model::{Alert, AlertKind};

type HmacSha256 = Hmac<Sha256>;

/// Accepts one batch of alerts, all sharing a kind (§4.8: "grouped by alert
/// kind into one batch call per kind"). A failure here is logged and
/// dropped — `NotifierFailure` never blocks or retries the detector pass
/// (§4.9, §7).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_batch(&self, kind: AlertKind, alerts: &[Alert]) -> Result<()>;
}

/// Dispatches each kind's batch to its own `send_batch` call, swallowing
/// and logging failures per §7 (`NotifierFailure`: "Logged; the detector
/// pass continues; no local retry").
pub async fn dispatch(notifier: &dyn Notifier, alerts: Vec<Alert>) {
    let mut by_kind: std::collections::HashMap<AlertKind, Vec<Alert>> = std::collections::HashMap::new();
    for alert in alerts {
        by_kind.entry(alert.kind).or_default().push(alert);
    }

    for (kind, batch) in by_kind {
        if let Err(err) = notifier.send_batch(kind, &batch).await {
            let app_err = AppError::NotifierFailure { kind: format!("{kind:?}"), count: batch.len(), source: err };
            warn!(?kind, count = batch.len(), error = %app_err, "notifier failed, alerts dropped");
        }
    }
}

/// HMAC-signed webhook delivery, grounded on the teacher's `DomeRestClient`
/// (`src/scrapers/dome_rest.rs`) for client construction and its
/// `vault/execution.rs` `sign_request` for HMAC signing — generalized from
/// a CLOB order signature to a generic request-body signature.
pub struct WebhookNotifier {
    http: Client,
    webhook_url: String,
    signing_secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, signing_secret: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { http, webhook_url, signing_secret })
    }

    fn sign(&self, body: &str, timestamp: i64) -> Result<Option<String>> {
        let Some(secret) = &self.signing_secret else { return Ok(None) };
        let message = format!("{timestamp}.{body}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("webhook HMAC key error: {e}"))?;
        mac.update(message.as_bytes());
        Ok(Some(hex::encode(mac.finalize().into_bytes())))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_batch(&self, kind: AlertKind, alerts: &[Alert]) -> Result<()> {
        let body = serde_json::json!({ "kind": kind, "alerts": alerts }).to_string();
        let timestamp = Utc::now().timestamp();

        let mut request = self
            .http
            .post(&self.webhook_url)
            .header("content-type", "application/json")
            .header("x-webhook-timestamp", timestamp.to_string())
            .body(body.clone());

        if let Some(signature) = self.sign(&body, timestamp)? {
            request = request.header("x-webhook-signature", signature);
        }

        let resp = request.send().await.context("webhook request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {text}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alert, VolatilityPayload};

    fn sample_alert() -> Alert {
        Alert::volatility(
            "volatility:binance:BTC/USDT".to_string(),
            VolatilityPayload {
                venue: "binance".into(),
                symbol: "BTC/USDT".into(),
                current_price: 103.0,
                reference_price: 100.0,
                price_change_pct: 3.0,
                current_volume: 60.0,
                average_volume: 10.0,
                volume_ratio: 6.0,
                price_percentile: None,
                thirty_day_high: None,
                thirty_day_low: None,
                thirty_day_avg: None,
            },
        )
    }

    struct FailingNotifier;
    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_batch(&self, _kind: AlertKind, _alerts: &[Alert]) -> Result<()> {
            anyhow::bail!("simulated failure")
        }
    }

    #[tokio::test]
    async fn dispatch_swallows_notifier_failures() {
        // Must not panic even though every batch fails.
        dispatch(&FailingNotifier, vec![sample_alert()]).await;
    }

    #[test]
    fn signing_is_deterministic_for_the_same_timestamp() {
        let notifier = WebhookNotifier::new(
            "https://example.invalid/webhook".to_string(),
            Some("secret".to_string()),
            10,
        )
        .unwrap();
        let a = notifier.sign("body", 1000).unwrap();
        let b = notifier.sign("body", 1000).unwrap();
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn no_secret_means_no_signature() {
        let notifier =
            WebhookNotifier::new("https://example.invalid/webhook".to_string(), None, 10).unwrap();
        assert!(notifier.sign("body", 1000).unwrap().is_none());
    }
}
