use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Client for the messaging bot (Telegram Bot API).
pub struct TelegramClient {
    client: Client,
    token: String,
    chat_id: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: String, chat_id: String) -> Self {
        Self::with_base_url(token, chat_id, TELEGRAM_API_URL.to_string())
    }

    pub fn with_base_url(token: String, chat_id: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            token,
            chat_id,
            base_url,
        }
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.base_url, self.token))
            .json(&request)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Auth("messaging bot rejected the token".to_string()));
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(AppError::Telegram(format!("HTTP {}: {}", status, error_text)));
            }
        }

        let api_response: ApiResponse = response.json().await?;
        if !api_response.ok {
            return Err(AppError::Telegram(
                api_response
                    .description
                    .unwrap_or_else(|| "send rejected without description".to_string()),
            ));
        }

        Ok(())
    }

    /// One lightweight request reporting token validity. Touches no
    /// pipeline state.
    pub async fn test_bot_token(token: &str) -> bool {
        Self::probe(TELEGRAM_API_URL, token).await
    }

    pub(crate) async fn probe(base_url: &str, token: &str) -> bool {
        let url = format!("{}/bot{}/getMe", base_url, token);
        match reqwest::get(&url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn sends_a_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "42", "text": "done"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client =
            TelegramClient::with_base_url("TOKEN".to_string(), "42".to_string(), server.uri());
        client.send_message("done").await.unwrap();
    }

    #[tokio::test]
    async fn api_level_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "chat not found"
            })))
            .mount(&server)
            .await;

        let client =
            TelegramClient::with_base_url("TOKEN".to_string(), "42".to_string(), server.uri());
        let err = client.send_message("done").await.unwrap_err();
        assert!(matches!(err, AppError::Telegram(_)));
    }

    #[tokio::test]
    async fn bad_token_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botBAD/sendMessage"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client =
            TelegramClient::with_base_url("BAD".to_string(), "42".to_string(), server.uri());
        let err = client.send_message("done").await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn token_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botGOOD/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/botBAD/getMe"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(TelegramClient::probe(&server.uri(), "GOOD").await);
        assert!(!TelegramClient::probe(&server.uri(), "BAD").await);
    }
}
