use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Trend source error: {0}")]
    TrendSource(String),

    #[error("Ollama error: {0}")]
    Ollama(String),

    #[error("Script rejected: {0}")]
    ScriptRejected(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Permanent content errors are never retried; the job fails outright.
    pub fn is_permanent(&self) -> bool {
        matches!(self, AppError::ScriptRejected(_))
    }

    /// Credential failures halt the dependent component until the
    /// configuration changes; retrying with the same key is pointless.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }
}
