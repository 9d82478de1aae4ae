use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};

pub const DEFAULT_USER_AGENT: &str = "socialbot/0.1";
pub const DEFAULT_INSTAGRAM_CONFIG: &str = "config.json";
pub const DEFAULT_TEMPLATE_PATH: &str = "assets/socials.html";
pub const DEFAULT_PAGE_TITLE: &str = "Main Page";

/// Bot identity and wiki endpoint, resolved once from the environment and
/// passed into each component explicitly.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub twitch_channel: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            domain: require_env("DOMAIN")?,
            username: require_env("BOT_USERNAME")?,
            password: require_env("BOT_PASSWORD")?,
            twitch_channel: optional_env("TWITCH_CHANNEL"),
        })
    }

    pub fn api_url(&self) -> String {
        format!("https://{}/api.php", self.domain)
    }
}

/// YouTube Data API credentials. Required only when the YouTube fetcher is
/// actually invoked, so resolution is separate from `BotConfig`.
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_key: String,
    pub channel_id: String,
}

impl YouTubeConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: require_env("YOUTUBE_TOKEN")?,
            channel_id: require_env("YOUTUBE_CHANNEL")?,
        })
    }
}

pub fn instagram_config_path() -> PathBuf {
    PathBuf::from(env_value("INSTAGRAM_CONFIG", DEFAULT_INSTAGRAM_CONFIG))
}

pub fn template_path() -> PathBuf {
    PathBuf::from(env_value("SOCIALS_TEMPLATE", DEFAULT_TEMPLATE_PATH))
}

fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => bail!("{key} env variable not set"),
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_value(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}
