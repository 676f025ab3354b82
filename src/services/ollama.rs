use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const OLLAMA_MODEL: &str = "llama3.2";

/// Script synthesis is the slow stage; give the model room but never
/// wait forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the local inference endpoint (Ollama).
pub struct ScriptGenerator {
    client: Client,
    endpoint: String,
}

impl ScriptGenerator {
    pub fn new(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Request a narration script for a trending topic.
    ///
    /// Empty or policy-declined output is a permanent content error;
    /// retrying the same topic would produce the same refusal.
    pub async fn generate_script(&self, topic: &str, channel: Option<&str>) -> Result<String> {
        let request = GenerateRequest {
            model: OLLAMA_MODEL,
            prompt: build_prompt(topic, channel),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Ollama(format!("HTTP {}: {}", status, error_text)));
        }

        let generated: GenerateResponse = response.json().await?;
        let script = clean_script(&generated.response);

        if script.is_empty() {
            return Err(AppError::ScriptRejected(
                "model returned empty output".to_string(),
            ));
        }
        if is_refusal(&script) {
            let first_line = script.lines().next().unwrap_or_default();
            return Err(AppError::ScriptRejected(format!(
                "model declined the topic: {}",
                first_line
            )));
        }

        Ok(script)
    }

    /// One lightweight request reporting endpoint reachability. Touches
    /// no pipeline state.
    pub async fn test_endpoint(endpoint: &str) -> bool {
        let url = format!("{}/api/tags", endpoint.trim_end_matches('/'));
        match reqwest::get(&url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn build_prompt(topic: &str, channel: Option<&str>) -> String {
    let context = match channel {
        Some(channel) => format!("\"{}\" (trending via {})", topic, channel),
        None => format!("\"{}\"", topic),
    };
    format!(
        "Write a punchy 45-second narration script for a vertical short video \
         about the trending topic {}.\n\
         Open with a hook, keep sentences short, and end with a question that \
         invites comments. Output only the narration text, no stage directions.",
        context
    )
}

/// Reasoning models wrap deliberation in <think> tags; strip them before
/// validating the script.
fn clean_script(raw: &str) -> String {
    static THINK_RE: OnceLock<Regex> = OnceLock::new();
    let re = THINK_RE
        .get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-tag regex"));
    re.replace_all(raw, "").trim().to_string()
}

fn is_refusal(script: &str) -> bool {
    let lowered = script.to_lowercase();
    ["i can't", "i cannot", "i'm sorry", "i am sorry", "as an ai"]
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}
