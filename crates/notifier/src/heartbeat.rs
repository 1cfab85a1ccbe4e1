use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, Result};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(25);

/// Periodic liveness ping so the execution service can tell the scanner is up.
pub struct Heartbeat {
    url: Url,
    secret: Option<String>,
    interval: Duration,
    http: Client,
}

impl Heartbeat {
    pub fn new(url: &str, secret: Option<String>, interval: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("invalid PING_URL '{url}': {e}")))?;
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            url,
            secret,
            interval,
            http,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut request = self.http.post(self.url.clone());
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }
        let resp = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!("ping returned HTTP {}", resp.status())));
        }
        Ok(())
    }

    /// Ping forever. Failures are logged and the loop keeps going. Call from
    /// `tokio::spawn` and abort the task on shutdown.
    pub async fn run(self) {
        info!(url = %self.url, interval_secs = self.interval.as_secs(), "Heartbeat started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.ping().await {
                Ok(()) => debug!("Heartbeat ok"),
                Err(e) => warn!(error = %e, "Heartbeat failed"),
            }
        }
    }
}
