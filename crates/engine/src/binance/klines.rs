use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use common::{Candle, CandleWindow, Error, MarketDataGateway, Result, Timeframe};

const KLINES_PATH: &str = "/fapi/v1/klines";
/// Binance rejects larger `limit` values on this endpoint.
const MAX_LIMIT: usize = 1500;

/// Public USDⓈ-M futures market data. No API key is needed for klines.
pub struct BinanceGateway {
    base_url: Url,
    http: Client,
}

impl BinanceGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid Binance base URL '{base_url}': {e}")))?;
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    fn klines_url(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Url> {
        let mut url = self
            .base_url
            .join(KLINES_PATH)
            .map_err(|e| Error::Config(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("interval", timeframe.as_str())
            .append_pair("limit", &limit.clamp(1, MAX_LIMIT).to_string());
        Ok(url)
    }
}

#[async_trait]
impl MarketDataGateway for BinanceGateway {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<CandleWindow> {
        let url = self.klines_url(symbol, timeframe, limit)?;
        debug!(symbol, timeframe = %timeframe, limit, "Fetching klines");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("{symbol}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Gateway(format!("{symbol}: {e}")))?;

        if !status.is_success() {
            return Err(Error::Gateway(format!("{symbol}: HTTP {status}: {body}")));
        }
        parse_klines(&body, Utc::now())
    }
}

// ─── Response parsing ─────────────────────────────────────────────────────────

/// Parse the klines array. A row is
/// `[open_time, open, high, low, close, volume, close_time, ...]` with
/// prices and volume as strings. A bar counts as closed once its close time
/// is not in the future.
pub(crate) fn parse_klines(body: &str, now: DateTime<Utc>) -> Result<CandleWindow> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| Error::Gateway(format!("malformed klines: {e}")))?;

    let candles = rows
        .iter()
        .map(|row| parse_row(row, now))
        .collect::<Result<Vec<_>>>()?;
    Ok(CandleWindow::new(candles))
}

fn parse_row(row: &[Value], now: DateTime<Utc>) -> Result<Candle> {
    if row.len() < 7 {
        return Err(Error::Gateway(format!("kline row has {} fields", row.len())));
    }
    let close_time = timestamp(&row[6])?;
    Ok(Candle {
        open_time: timestamp(&row[0])?,
        close_time,
        open: number(&row[1])?,
        high: number(&row[2])?,
        low: number(&row[3])?,
        close: number(&row[4])?,
        volume: number(&row[5])?,
        is_closed: close_time <= now,
    })
}

fn timestamp(value: &Value) -> Result<DateTime<Utc>> {
    value
        .as_i64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| Error::Gateway(format!("bad kline timestamp {value}")))
}

fn number(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    };
    parsed.ok_or_else(|| Error::Gateway(format!("bad kline number {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"[
        [1767225600000, "100.0", "101.5", "99.5", "101.0", "1200.5", 1767229199999, "0", 10, "0", "0", "0"],
        [1767229200000, "101.0", "102.0", "100.0", "100.5", "800", 1767232799999, "0", 8, "0", "0", "0"]
    ]"#;

    #[test]
    fn parses_rows_and_marks_forming_bar() {
        // Between the first bar's close and the second's.
        let now = Utc.timestamp_millis_opt(1_767_230_000_000).unwrap();
        let window = parse_klines(BODY, now).unwrap();

        assert_eq!(window.len(), 2);
        let first = &window.candles[0];
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 101.5);
        assert_eq!(first.volume, 1200.5);
        assert!(first.is_closed);
        assert!(!window.candles[1].is_closed);
        assert_eq!(window.closed().len(), 1);
    }

    #[test]
    fn all_bars_closed_after_last_close_time() {
        let now = Utc.timestamp_millis_opt(1_767_232_800_000).unwrap();
        let window = parse_klines(BODY, now).unwrap();
        assert_eq!(window.closed().len(), 2);
    }

    #[test]
    fn rejects_malformed_payloads() {
        let now = Utc::now();
        assert!(matches!(parse_klines("{\"code\":-1121}", now), Err(Error::Gateway(_))));
        assert!(matches!(parse_klines("[[1, \"2\"]]", now), Err(Error::Gateway(_))));
        assert!(matches!(
            parse_klines(r#"[[1, "x", "1", "1", "1", "1", 2]]"#, now),
            Err(Error::Gateway(_))
        ));
    }

    #[test]
    fn url_carries_symbol_interval_and_limit() {
        let gateway = BinanceGateway::new("https://fapi.binance.com", Duration::from_secs(10)).unwrap();
        let url = gateway.klines_url("BTCUSDT", Timeframe::M15, 300).unwrap();
        assert_eq!(
            url.as_str(),
            "https://fapi.binance.com/fapi/v1/klines?symbol=BTCUSDT&interval=15m&limit=300"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        assert!(matches!(
            BinanceGateway::new("not a url", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }
}
