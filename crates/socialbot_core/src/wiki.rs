use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Explicit client configuration so tests can point the bot at a fake
/// endpoint instead of reading globals at module load.
#[derive(Debug, Clone)]
pub struct WikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl WikiClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// The operations the edit orchestrator needs from a wiki. `MediaWikiClient`
/// is the real implementation; tests substitute a mock.
pub trait WikiApi {
    /// Two-step login handshake followed by a csrf token fetch. The token is
    /// scoped to this client's cookie session and must not outlive the run.
    fn acquire_edit_token(&mut self, username: &str, password: &str) -> Result<String>;
    /// Latest revision content of a page.
    fn get_page(&mut self, title: &str) -> Result<String>;
    /// Full-body replace of a page. Returns the API `result` field.
    fn edit_page(&mut self, token: &str, title: &str, text: &str, summary: &str)
    -> Result<String>;
    fn request_count(&self) -> usize;
}

pub struct MediaWikiClient {
    client: Client,
    config: WikiClientConfig,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: WikiClientConfig) -> Result<Self> {
        // Cookies carry the login session between the three handshake calls.
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid wiki API URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            pairs.push(((*key).to_string(), value.clone()));
        }

        self.request_count += 1;
        let response = self
            .client
            .get(base_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;

        let status = response.status();
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}");
        }
        if let Some(detail) = header_error(response.headers()) {
            bail!("MediaWiki API error header: {detail}");
        }

        let payload: Value = response
            .json()
            .context("failed to decode MediaWiki API JSON response")?;
        check_api_error(&payload)?;
        Ok(payload)
    }

    fn request_json_post(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            pairs.push(((*key).to_string(), value.clone()));
        }

        self.request_count += 1;
        let response = self
            .client
            .post(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .form(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;

        let status = response.status();
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}");
        }
        if let Some(detail) = header_error(response.headers()) {
            bail!("MediaWiki API error header: {detail}");
        }

        let payload: Value = response
            .json()
            .context("failed to decode MediaWiki API JSON response")?;
        check_api_error(&payload)?;
        Ok(payload)
    }
}

impl WikiApi for MediaWikiClient {
    fn acquire_edit_token(&mut self, username: &str, password: &str) -> Result<String> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let login_token = login_token_from(token_response)?;

        let login_response = self.request_json_post(&[
            ("action", "login".to_string()),
            ("lgname", username.to_string()),
            ("lgpassword", password.to_string()),
            ("lgtoken", login_token),
        ])?;
        check_login_result(login_response)?;

        let csrf_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        csrf_token_from(csrf_response)
    }

    fn get_page(&mut self, title: &str) -> Result<String> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        page_content_from(response, title)
    }

    fn edit_page(
        &mut self,
        token: &str,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<String> {
        let response = self.request_json_post(&[
            ("action", "edit".to_string()),
            ("title", title.to_string()),
            ("text", text.to_string()),
            ("summary", summary.to_string()),
            ("bot", "1".to_string()),
            ("token", token.to_string()),
        ])?;
        edit_result_from(response, title)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn header_error(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("MediaWiki-API-Error")
        .map(|header| header.to_str().unwrap_or("unreadable header").to_string())
}

fn check_api_error(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(())
}

fn login_token_from(payload: Value) -> Result<String> {
    let parsed: TokenQueryResponse =
        serde_json::from_value(payload).context("failed to decode login token response")?;
    parsed
        .query
        .tokens
        .and_then(|tokens| tokens.logintoken)
        .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))
}

fn check_login_result(payload: Value) -> Result<()> {
    let parsed: LoginResponse =
        serde_json::from_value(payload).context("failed to decode login response")?;
    match parsed.login.result.as_deref() {
        Some("Success") => Ok(()),
        other => bail!(
            "MediaWiki login failed: {}",
            parsed
                .login
                .reason
                .or_else(|| other.map(ToString::to_string))
                .unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn csrf_token_from(payload: Value) -> Result<String> {
    let parsed: TokenQueryResponse =
        serde_json::from_value(payload).context("failed to decode csrf token response")?;
    parsed
        .query
        .tokens
        .and_then(|tokens| tokens.csrftoken)
        .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))
}

fn page_content_from(payload: Value, title: &str) -> Result<String> {
    let parsed: QueryResponse =
        serde_json::from_value(payload).context("failed to decode page content response")?;
    let page = parsed
        .query
        .pages
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no page entry returned for {title}"))?;
    if page.missing.unwrap_or(false) {
        bail!("page does not exist: {title}");
    }
    let revision = page
        .revisions
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no revisions returned for {title}"))?;
    revision
        .slots
        .and_then(|slots| slots.main)
        .map(|slot| slot.content)
        .ok_or_else(|| anyhow::anyhow!("no main slot content returned for {title}"))
}

fn edit_result_from(payload: Value, title: &str) -> Result<String> {
    let parsed: EditResponse =
        serde_json::from_value(payload).context("failed to decode edit response")?;
    let edit = parsed
        .edit
        .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
    match edit.result.as_deref() {
        Some("Success") => Ok("Success".to_string()),
        other => bail!(
            "MediaWiki edit failed for {title}: {}",
            other.unwrap_or("unknown")
        ),
    }
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    missing: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
