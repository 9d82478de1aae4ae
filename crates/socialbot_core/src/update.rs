use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::config::{self, BotConfig, YouTubeConfig};
use crate::instagram::{InstagramClient, InstagramClientConfig};
use crate::template::{TemplateData, load_template, render_snippet};
use crate::transform::{splice_socials_section, update_background_image};
use crate::wiki::{MediaWikiClient, WikiApi, WikiClientConfig};
use crate::youtube::YouTubeClient;

/// Which social feed the snippet data comes from. The original bot shipped
/// near-identical script variants per source; this is the consolidated axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialSource {
    None,
    Placeholder,
    Instagram,
    YouTube,
}

impl SocialSource {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }
        if value.eq_ignore_ascii_case("placeholder") {
            return Ok(Self::Placeholder);
        }
        if value.eq_ignore_ascii_case("instagram") {
            return Ok(Self::Instagram);
        }
        if value.eq_ignore_ascii_case("youtube") {
            return Ok(Self::YouTube);
        }
        bail!("unsupported social source: {value} (expected none|placeholder|instagram|youtube)")
    }
}

pub const DEFAULT_EDIT_SUMMARY: &str = "Update socials section";

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub page_title: String,
    pub css_page: Option<String>,
    pub source: SocialSource,
    pub summary: String,
    pub template_path: PathBuf,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            page_title: config::DEFAULT_PAGE_TITLE.to_string(),
            css_page: None,
            source: SocialSource::Placeholder,
            summary: DEFAULT_EDIT_SUMMARY.to_string(),
            template_path: config::template_path(),
        }
    }
}

/// Snippet data plus the image URL the CSS pass swaps in, when one exists.
#[derive(Debug, Clone, Default)]
pub struct GatheredContent {
    pub data: TemplateData,
    pub background_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CssEditReport {
    pub title: String,
    pub changed: bool,
    pub edit_result: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub page_title: String,
    pub edit_result: String,
    pub css: Option<CssEditReport>,
    pub request_count: usize,
}

/// Full run against the real wiki: gather content, render, splice, edit.
pub fn run_update(bot_config: &BotConfig, options: &UpdateOptions) -> Result<UpdateReport> {
    let content = gather_content(options.source, bot_config)?;
    let template = load_template(&options.template_path)?;
    let mut client = MediaWikiClient::new(WikiClientConfig::new(bot_config.api_url()))?;
    run_update_with_api(
        options,
        &template,
        &content,
        &mut client,
        (&bot_config.username, &bot_config.password),
    )
}

/// Orchestrator body, generic over the wiki seam so tests can inject a mock.
/// Every step failure aborts the run; nothing is caught and continued.
pub fn run_update_with_api<A: WikiApi>(
    options: &UpdateOptions,
    template: &str,
    content: &GatheredContent,
    api: &mut A,
    credentials: (&str, &str),
) -> Result<UpdateReport> {
    let (username, password) = credentials;
    let token = api
        .acquire_edit_token(username, password)
        .context("wiki login failed")?;

    let page_html = api
        .get_page(&options.page_title)
        .with_context(|| format!("failed to fetch {}", options.page_title))?;
    let snippet = render_snippet(template, &content.data);
    let new_page_html = splice_socials_section(&page_html, &snippet)?;
    let edit_result = api
        .edit_page(&token, &options.page_title, &new_page_html, &options.summary)
        .with_context(|| format!("failed to edit {}", options.page_title))?;

    let css = match &options.css_page {
        Some(css_title) => Some(run_css_pass(options, content, api, &token, css_title)?),
        None => None,
    };

    Ok(UpdateReport {
        page_title: options.page_title.clone(),
        edit_result,
        css,
        request_count: api.request_count(),
    })
}

fn run_css_pass<A: WikiApi>(
    options: &UpdateOptions,
    content: &GatheredContent,
    api: &mut A,
    token: &str,
    css_title: &str,
) -> Result<CssEditReport> {
    let Some(image_url) = &content.background_image else {
        // No fresh image this run; the CSS page keeps its current background.
        return Ok(CssEditReport {
            title: css_title.to_string(),
            changed: false,
            edit_result: None,
        });
    };

    let css = api
        .get_page(css_title)
        .with_context(|| format!("failed to fetch {css_title}"))?;
    let new_css = update_background_image(&css, image_url)?;
    if new_css == css {
        return Ok(CssEditReport {
            title: css_title.to_string(),
            changed: false,
            edit_result: None,
        });
    }

    let edit_result = api
        .edit_page(token, css_title, &new_css, &options.summary)
        .with_context(|| format!("failed to edit {css_title}"))?;
    Ok(CssEditReport {
        title: css_title.to_string(),
        changed: true,
        edit_result: Some(edit_result),
    })
}

/// Fetch fresh data for the selected source and shape it for the template.
pub fn gather_content(source: SocialSource, bot_config: &BotConfig) -> Result<GatheredContent> {
    let mut content = match source {
        SocialSource::None => GatheredContent::default(),
        SocialSource::Placeholder => placeholder_content(),
        SocialSource::Instagram => {
            let client =
                InstagramClient::new(InstagramClientConfig::new(config::instagram_config_path()))?;
            let post = client.last_post()?;
            let background_image = post.display_image().map(ToString::to_string);
            let mut data = TemplateData::new();
            data.insert("instagram_name".to_string(), post.name);
            data.insert("instagram_link".to_string(), post.link);
            data.insert("instagram_description".to_string(), post.description);
            if let Some(image) = post.image {
                data.insert("instagram_image".to_string(), image);
            }
            GatheredContent {
                data,
                background_image,
            }
        }
        SocialSource::YouTube => {
            let client = YouTubeClient::new(YouTubeConfig::from_env()?)?;
            let video = client.last_video(None)?;
            let mut data = TemplateData::new();
            data.insert("youtube_link".to_string(), video.watch_url());
            data.insert("youtube_video_id".to_string(), video.video_id);
            data.insert("youtube_title".to_string(), video.title);
            data.insert("youtube_description".to_string(), video.description);
            data.insert("youtube_channel_title".to_string(), video.channel_title);
            data.insert("youtube_thumbnail".to_string(), video.thumbnails.high.url);
            GatheredContent {
                data,
                background_image: None,
            }
        }
    };

    if let Some(channel) = &bot_config.twitch_channel {
        content
            .data
            .insert("twitch_channel".to_string(), channel.clone());
    }
    Ok(content)
}

fn placeholder_content() -> GatheredContent {
    let mut data = TemplateData::new();
    data.insert(
        "youtube_thumbnail".to_string(),
        "https://i.ytimg.com/vi/CJ3hfxxlF2Q/maxresdefault.jpg".to_string(),
    );
    data.insert(
        "youtube_title".to_string(),
        "Progressive Victory All Hands Q2".to_string(),
    );
    data.insert(
        "youtube_description".to_string(),
        "Quarterly all-hands meeting recap.".to_string(),
    );
    data.insert(
        "youtube_link".to_string(),
        "https://www.youtube.com/watch?v=CJ3hfxxlF2Q".to_string(),
    );
    data.insert(
        "youtube_channel_title".to_string(),
        "Progressive Victory".to_string(),
    );
    data.insert("youtube_video_id".to_string(), "CJ3hfxxlF2Q".to_string());
    GatheredContent {
        data,
        background_image: None,
    }
}
