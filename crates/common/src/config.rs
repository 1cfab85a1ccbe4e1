use crate::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite://trendwatch.db?mode=rwc";
const DEFAULT_BINANCE_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_SCANNER_CONFIG_PATH: &str = "config/scanner.toml";

/// Process configuration loaded from environment variables at startup.
///
/// Every sink is optional: a missing token or URL disables that sink. Values
/// that are present but malformed are reported as `Error::Config`.
#[derive(Debug, Clone)]
pub struct Config {
    // Market data
    pub binance_base_url: String,

    // Telegram
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    // Webhook executor
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub ping_url: Option<String>,

    // Database
    pub database_url: String,

    // Scanner tunables file path
    pub scanner_config_path: String,
}

impl Config {
    /// Load from the process environment. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_chat_ids = match optional("TELEGRAM_CHAT_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>().map_err(|_| {
                        Error::Config(format!("TELEGRAM_CHAT_IDS contains non-numeric ID: '{s}'"))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Config {
            binance_base_url: optional("BINANCE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BINANCE_BASE_URL.to_string()),
            telegram_token: optional("TELEGRAM_TOKEN"),
            telegram_chat_ids,
            webhook_url: optional("WEBHOOK_URL"),
            webhook_secret: optional("WEBHOOK_SECRET"),
            ping_url: optional("PING_URL"),
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            scanner_config_path: optional("SCANNER_CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_SCANNER_CONFIG_PATH.to_string()),
        })
    }
}
