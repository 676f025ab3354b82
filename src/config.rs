use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Pipeline configuration, stored as a singleton row in the database.
///
/// Mutated only through `save_config`; the collector, workers, and
/// notifier re-read it at the start of each cycle so edits take effect
/// without a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub youtube_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    #[serde(default = "default_ollama_endpoint")]
    pub ollama_endpoint: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

impl Default for Config {
    fn default() -> Self {
        Self {
            youtube_api_key: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            ollama_endpoint: default_ollama_endpoint(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Config {
    /// Collapse empty or whitespace-only credentials to `None`.
    ///
    /// Absent and empty are the same thing as far as the pipeline is
    /// concerned; normalizing on save and load keeps every consumption
    /// site to a single `is_some` check.
    pub fn normalized(mut self) -> Self {
        self.youtube_api_key = normalize(self.youtube_api_key);
        self.telegram_bot_token = normalize(self.telegram_bot_token);
        self.telegram_chat_id = normalize(self.telegram_chat_id);
        self.ollama_endpoint = self.ollama_endpoint.trim().to_string();
        if self.ollama_endpoint.is_empty() {
            self.ollama_endpoint = default_ollama_endpoint();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.ollama_endpoint)
            .map_err(|e| AppError::Config(format!("invalid Ollama endpoint: {}", e)))?;
        if self.poll_interval_secs == 0 {
            return Err(AppError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_normalize_to_none() {
        let config = Config {
            youtube_api_key: Some("".to_string()),
            telegram_bot_token: Some("   ".to_string()),
            telegram_chat_id: Some("12345".to_string()),
            ..Config::default()
        }
        .normalized();

        assert_eq!(config.youtube_api_key, None);
        assert_eq!(config.telegram_bot_token, None);
        assert_eq!(config.telegram_chat_id, Some("12345".to_string()));
    }

    #[test]
    fn blank_endpoint_falls_back_to_default() {
        let config = Config {
            ollama_endpoint: "  ".to_string(),
            ..Config::default()
        }
        .normalized();

        assert_eq!(config.ollama_endpoint, "http://localhost:11434");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_endpoint() {
        let config = Config {
            ollama_endpoint: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
