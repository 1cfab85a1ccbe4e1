use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info};
use url::Url;

use common::{Error, NotificationSink, Result, SignalVerdict};

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Body POSTed to the execution service for every admitted verdict.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub symbol: &'a str,
    pub signal: &'a str,
    pub timeframe: &'a str,
    pub price: f64,
    pub reason: &'a str,
    pub evaluated_at: DateTime<Utc>,
}

impl<'a> WebhookPayload<'a> {
    pub fn from_verdict(verdict: &'a SignalVerdict) -> Self {
        Self {
            symbol: &verdict.target.symbol,
            signal: verdict.direction.as_str(),
            timeframe: verdict.target.timeframe.as_str(),
            price: verdict.price,
            reason: &verdict.reason,
            evaluated_at: verdict.evaluated_at,
        }
    }
}

/// Hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    type HmacSha256 = Hmac<Sha256>;
    // Any key length is valid for HMAC.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Forwards verdicts to an HTTP endpoint as signed JSON.
///
/// With a secret configured every request carries `Authorization: Bearer`
/// and an `X-Signature` HMAC of the exact body bytes. Any non-2xx response
/// is a failed delivery.
pub struct WebhookNotifier {
    url: Url,
    secret: Option<String>,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(url: &str, secret: Option<String>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("invalid WEBHOOK_URL '{url}': {e}")))?;
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        info!(url = %url, signed = secret.is_some(), "Webhook notifier enabled");
        Ok(Self { url, secret, http })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, verdict: &SignalVerdict) -> Result<()> {
        let body = serde_json::to_vec(&WebhookPayload::from_verdict(verdict))?;

        let mut request = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request
                .bearer_auth(secret)
                .header(SIGNATURE_HEADER, sign(secret, &body));
        }

        let resp = request
            .body(body)
            .send()
            .await
            .map_err(|e| Error::sink(self.name(), e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::sink(self.name(), format!("HTTP {status}: {text}")));
        }
        debug!(pair = %verdict.target, direction = %verdict.direction, "Webhook delivered");
        Ok(())
    }
}
