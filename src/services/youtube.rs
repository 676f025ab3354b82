use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::NewTrend;

const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Stable, ancient upload used for the key probe.
const PROBE_VIDEO_ID: &str = "dQw4w9WgXcQ";

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
}

/// Client for the trend source (YouTube Data API).
pub struct TrendSourceClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TrendSourceClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, YOUTUBE_API_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            api_key,
            base_url,
        }
    }

    /// Fetch the current most-popular chart, bounded by `max_results`.
    pub async fn fetch_trending(&self, max_results: usize) -> Result<Vec<NewTrend>> {
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet,statistics"),
                ("chart", "mostPopular"),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Auth("trend source rejected the API key".to_string()));
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(AppError::TrendSource(format!(
                    "HTTP {}: {}",
                    status, error_text
                )));
            }
        }

        let list: VideoListResponse = response.json().await?;

        let trends = list
            .items
            .into_iter()
            .filter_map(|item| {
                let snippet = item.snippet?;
                Some(NewTrend {
                    video_id: item.id,
                    title: snippet.title,
                    channel: snippet.channel_title,
                    score: item
                        .statistics
                        .and_then(|s| s.view_count)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                })
            })
            .collect();

        Ok(trends)
    }

    /// One lightweight request reporting key validity. Touches no
    /// pipeline state.
    pub async fn test_api_key(api_key: &str) -> bool {
        Self::probe(YOUTUBE_API_URL, api_key).await
    }

    pub(crate) async fn probe(base_url: &str, api_key: &str) -> bool {
        let url = format!(
            "{}/videos?part=id&id={}&key={}",
            base_url, PROBE_VIDEO_ID, api_key
        );
        match reqwest::get(&url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
