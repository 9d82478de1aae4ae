use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::YouTubeConfig;

pub const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Most recent video of a channel, flattened from the search response's
/// id/snippet fields.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct YouTubeVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_title: String,
    pub published_at: String,
    pub thumbnails: Thumbnails,
}

impl YouTubeVideo {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Thumbnails {
    #[serde(default)]
    pub default: Thumbnail,
    #[serde(default)]
    pub medium: Thumbnail,
    #[serde(default)]
    pub high: Thumbnail,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: String,
}

pub struct YouTubeClient {
    client: Client,
    config: YouTubeConfig,
    search_url: String,
}

impl YouTubeClient {
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .context("failed to build YouTube HTTP client")?;
        Ok(Self {
            client,
            config,
            search_url: SEARCH_URL.to_string(),
        })
    }

    /// Single date-ordered search limited to one result.
    pub fn last_video(&self, channel_id: Option<&str>) -> Result<YouTubeVideo> {
        let channel_id = channel_id.unwrap_or(&self.config.channel_id);
        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("channelId", channel_id),
                ("part", "snippet"),
                ("order", "date"),
                ("maxResults", "1"),
            ])
            .send()
            .context("failed to call YouTube Data API")?;

        // Status is checked before any JSON decoding is attempted.
        let status = response.status();
        if !status.is_success() {
            bail!("failed to fetch videos (HTTP {status})");
        }

        let payload: SearchResponse = response
            .json()
            .context("failed to decode YouTube search response")?;
        video_from_response(payload, channel_id)
    }
}

fn video_from_response(payload: SearchResponse, channel_id: &str) -> Result<YouTubeVideo> {
    let item = payload
        .items
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no videos found for channel {channel_id}"))?;
    Ok(YouTubeVideo {
        video_id: item.id.video_id,
        title: item.snippet.title,
        description: item.snippet.description,
        channel_title: item.snippet.channel_title,
        published_at: item.snippet.published_at,
        thumbnails: item.snippet.thumbnails,
    })
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt", default)]
    published_at: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}
