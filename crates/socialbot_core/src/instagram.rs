use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

pub const GRAPH_BASE_URL: &str = "https://graph.instagram.com";

/// Long-lived Instagram tokens are valid for 60 days.
const TOKEN_MAX_AGE_MS: u64 = 60 * 24 * 60 * 60 * 1_000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The app-config file is the only durable state in the whole bot. Field
/// names match the original on-disk JSON so existing files keep working.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "creationTime", skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstagramPost {
    pub name: String,
    pub link: String,
    pub description: String,
    pub image: Option<String>,
    pub video: Option<String>,
    pub media_type: String,
}

impl InstagramPost {
    /// URL used for the `.ig-card` background swap. Thumbnail when the API
    /// provides one, media URL otherwise.
    pub fn display_image(&self) -> Option<&str> {
        self.image.as_deref().or(self.video.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct InstagramClientConfig {
    pub base_url: String,
    pub config_path: PathBuf,
    pub timeout_ms: u64,
}

impl InstagramClientConfig {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            base_url: GRAPH_BASE_URL.to_string(),
            config_path: config_path.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

pub struct InstagramClient {
    client: Client,
    config: InstagramClientConfig,
}

impl InstagramClient {
    pub fn new(config: InstagramClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build Instagram HTTP client")?;
        Ok(Self { client, config })
    }

    /// Most recent IMAGE post for the configured account, refreshing the
    /// long-lived token first when it is 60 days old or more.
    pub fn last_post(&self) -> Result<InstagramPost> {
        let app_config = load_app_config(&self.config.config_path)?;
        let config_path = self.config.config_path.clone();
        let app_config = ensure_fresh_token(&config_path, app_config, now_millis()?, |token| {
            self.request_refresh(token)
        })?;

        let profile = self.fetch_profile(&app_config.access_token)?;
        let media = self.fetch_media(&app_config.access_token)?;
        let post = select_image_post(&media.data)
            .ok_or_else(|| anyhow::anyhow!("could not find any recent image posts"))?;
        Ok(normalize_post(&profile.username, post))
    }

    fn request_refresh(&self, access_token: &str) -> Result<String> {
        let url = format!(
            "{}/refresh_access_token?grant_type=ig_refresh_token&access_token={access_token}",
            self.config.base_url
        );
        let payload: RefreshResponse = self
            .request_json(&url)
            .context("failed to refresh Instagram access token")?;
        Ok(payload.access_token)
    }

    fn fetch_profile(&self, access_token: &str) -> Result<UserProfile> {
        let url = format!(
            "{}/me?fields=username,profile_picture_url&access_token={access_token}",
            self.config.base_url
        );
        self.request_json(&url)
            .context("failed to fetch Instagram profile")
    }

    fn fetch_media(&self, access_token: &str) -> Result<MediaListResponse> {
        let url = format!(
            "{}/me/media?fields=id,caption,permalink,media_type,media_url,thumbnail_url&access_token={access_token}",
            self.config.base_url
        );
        self.request_json(&url)
            .context("failed to fetch Instagram media list")
    }

    fn request_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .context("failed to call Instagram Graph API")?;
        let status = response.status();
        if !status.is_success() {
            bail!("Instagram Graph API request failed with HTTP {status}");
        }
        response
            .json()
            .context("failed to decode Instagram Graph API response")
    }
}

/// Fatal configuration error when the file is missing or not valid JSON.
pub fn load_app_config(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Instagram config file does not exist: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Instagram config file is invalid: {}", path.display()))
}

pub fn store_app_config(path: &Path, config: &AppConfig) -> Result<()> {
    let rendered =
        serde_json::to_string(config).context("failed to serialize Instagram config")?;
    fs::write(path, rendered)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn token_needs_refresh(creation_time_ms: u64, now_ms: u64) -> bool {
    now_ms.saturating_sub(creation_time_ms) >= TOKEN_MAX_AGE_MS
}

/// Bootstrap and refresh policy for the app-config file. A config without a
/// creation time is stamped with `now_ms` and persisted before any API call;
/// a token at or past the 60-day limit is exchanged through `refresh` exactly
/// once and the rewritten config persisted with a new creation time.
fn ensure_fresh_token<F>(
    path: &Path,
    mut config: AppConfig,
    now_ms: u64,
    refresh: F,
) -> Result<AppConfig>
where
    F: FnOnce(&str) -> Result<String>,
{
    let creation_time = match config.creation_time {
        Some(value) => value,
        None => {
            config.creation_time = Some(now_ms);
            store_app_config(path, &config)?;
            now_ms
        }
    };

    if token_needs_refresh(creation_time, now_ms) {
        let access_token = refresh(&config.access_token)?;
        config = AppConfig {
            access_token,
            creation_time: Some(now_ms),
        };
        store_app_config(path, &config)?;
    }
    Ok(config)
}

pub fn select_image_post(items: &[MediaItem]) -> Option<&MediaItem> {
    items.iter().find(|item| item.media_type == "IMAGE")
}

fn normalize_post(username: &str, item: &MediaItem) -> InstagramPost {
    let link = item
        .permalink
        .clone()
        .unwrap_or_else(|| format!("https://www.instagram.com/p/{}/", item.id));
    InstagramPost {
        name: username.to_string(),
        link,
        description: item.caption.clone().unwrap_or_default(),
        image: item.thumbnail_url.clone(),
        video: item.media_url.clone(),
        media_type: item.media_type.clone(),
    }
}

fn now_millis() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    username: String,
}

#[derive(Debug, Deserialize, Default)]
struct MediaListResponse {
    #[serde(default)]
    data: Vec<MediaItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub caption: Option<String>,
    pub permalink: Option<String>,
    pub media_type: String,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

    fn media_item(id: &str, media_type: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            caption: Some(format!("caption for {id}")),
            permalink: Some(format!("https://www.instagram.com/p/{id}/")),
            media_type: media_type.to_string(),
            media_url: Some(format!("https://cdn.example/{id}.jpg")),
            thumbnail_url: None,
        }
    }

    #[test]
    fn token_younger_than_sixty_days_is_kept() {
        let now = 100 * DAY_MS;
        assert!(!token_needs_refresh(now - 59 * DAY_MS, now));
    }

    #[test]
    fn token_older_than_sixty_days_needs_refresh() {
        let now = 100 * DAY_MS;
        assert!(token_needs_refresh(now - 61 * DAY_MS, now));
        assert!(token_needs_refresh(now - 60 * DAY_MS, now));
    }

    #[test]
    fn image_post_is_selected_over_newer_video() {
        let items = vec![media_item("vid1", "VIDEO"), media_item("img1", "IMAGE")];
        let selected = select_image_post(&items).expect("image post");
        assert_eq!(selected.id, "img1");
    }

    #[test]
    fn carousel_and_video_only_lists_select_nothing() {
        let items = vec![
            media_item("vid1", "VIDEO"),
            media_item("car1", "CAROUSEL_ALBUM"),
        ];
        assert!(select_image_post(&items).is_none());
    }

    #[test]
    fn normalize_falls_back_to_constructed_permalink() {
        let mut item = media_item("img9", "IMAGE");
        item.permalink = None;
        let post = normalize_post("progressivevictory", &item);
        assert_eq!(post.link, "https://www.instagram.com/p/img9/");
        assert_eq!(post.name, "progressivevictory");
        assert_eq!(post.media_type, "IMAGE");
    }

    #[test]
    fn app_config_round_trips_original_field_names() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"accessToken":"IGQVJ-token","creationTime":1234}"#)
            .expect("write config");

        let config = load_app_config(&path).expect("load config");
        assert_eq!(config.access_token, "IGQVJ-token");
        assert_eq!(config.creation_time, Some(1234));

        store_app_config(&path, &config).expect("store config");
        let raw = fs::read_to_string(&path).expect("read config");
        assert!(raw.contains("\"accessToken\""));
        assert!(raw.contains("\"creationTime\""));
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let error = load_app_config(Path::new("/nonexistent/config.json")).expect_err("must fail");
        assert!(error.to_string().contains("does not exist"));
    }

    #[test]
    fn invalid_config_file_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").expect("write config");
        let error = load_app_config(&path).expect_err("must fail");
        assert!(error.to_string().contains("invalid"));
    }

    #[test]
    fn token_at_sixty_one_days_is_refreshed_exactly_once_and_persisted() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        let created = 10 * DAY_MS;
        fs::write(
            &path,
            format!(r#"{{"accessToken":"old-token","creationTime":{created}}}"#),
        )
        .expect("write config");

        let now = created + 61 * DAY_MS;
        let mut calls = 0;
        let config = load_app_config(&path).expect("load config");
        let refreshed = ensure_fresh_token(&path, config, now, |token| {
            calls += 1;
            assert_eq!(token, "old-token");
            Ok("new-token".to_string())
        })
        .expect("refresh");

        assert_eq!(calls, 1);
        assert_eq!(refreshed.access_token, "new-token");
        assert_eq!(refreshed.creation_time, Some(now));
        let on_disk = load_app_config(&path).expect("reload config");
        assert_eq!(on_disk, refreshed);
    }

    #[test]
    fn token_at_fifty_nine_days_is_kept_and_file_untouched() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        let created = 10 * DAY_MS;
        let raw = format!(r#"{{"accessToken":"old-token","creationTime":{created}}}"#);
        fs::write(&path, &raw).expect("write config");

        let now = created + 59 * DAY_MS;
        let mut calls = 0;
        let config = load_app_config(&path).expect("load config");
        let kept = ensure_fresh_token(&path, config, now, |_| {
            calls += 1;
            Ok("unexpected".to_string())
        })
        .expect("keep");

        assert_eq!(calls, 0);
        assert_eq!(kept.access_token, "old-token");
        assert_eq!(kept.creation_time, Some(created));
        assert_eq!(fs::read_to_string(&path).expect("read config"), raw);
    }

    #[test]
    fn first_run_bootstrap_stamps_creation_time_without_refreshing() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"accessToken":"tok"}"#).expect("write config");

        let now = 99 * DAY_MS;
        let mut calls = 0;
        let config = load_app_config(&path).expect("load config");
        let stamped = ensure_fresh_token(&path, config, now, |_| {
            calls += 1;
            Ok("unexpected".to_string())
        })
        .expect("bootstrap");

        assert_eq!(calls, 0);
        assert_eq!(stamped.creation_time, Some(now));
        let on_disk = load_app_config(&path).expect("reload config");
        assert_eq!(on_disk.creation_time, Some(now));
        assert_eq!(on_disk.access_token, "tok");
    }

    #[test]
    fn refresh_failure_propagates_and_leaves_file_untouched() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        let raw = r#"{"accessToken":"old-token","creationTime":0}"#;
        fs::write(&path, raw).expect("write config");

        let config = load_app_config(&path).expect("load config");
        let error = ensure_fresh_token(&path, config, 61 * DAY_MS, |_| {
            anyhow::bail!("Instagram Graph API request failed with HTTP 400")
        })
        .expect_err("must fail");

        assert!(error.to_string().contains("HTTP 400"));
        assert_eq!(fs::read_to_string(&path).expect("read config"), raw);
    }

    #[test]
    fn config_without_creation_time_parses() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"accessToken":"tok"}"#).expect("write config");
        let config = load_app_config(&path).expect("load config");
        assert_eq!(config.creation_time, None);
    }

    #[test]
    fn display_image_prefers_thumbnail() {
        let post = InstagramPost {
            name: "acct".to_string(),
            link: "https://www.instagram.com/p/x/".to_string(),
            description: String::new(),
            image: Some("https://cdn.example/thumb.jpg".to_string()),
            video: Some("https://cdn.example/full.jpg".to_string()),
            media_type: "IMAGE".to_string(),
        };
        assert_eq!(post.display_image(), Some("https://cdn.example/thumb.jpg"));
    }
}
