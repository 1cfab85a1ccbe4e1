use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Not enough closed candles to compute the longest indicator yet.
    #[error("Insufficient data: have {have} closed candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Market data gateway error: {0}")]
    Gateway(String),

    #[error("Sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    #[error("Configuration inconsistency: {0}")]
    ConfigInconsistency(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn sink(sink: impl Into<String>, message: impl ToString) -> Self {
        Error::Sink {
            sink: sink.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
