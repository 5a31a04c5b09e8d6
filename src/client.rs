use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::error::{Result, SearchError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Results requested per search page. GitHub caps this at 100.
pub const PER_PAGE: u32 = 100;

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Repository summary as embedded in code search items.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub fork: bool,
    pub owner: Owner,
}

/// One matched file in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub path: String,
    pub sha: String,
    /// Contents API URL; the file body is fetched from here on demand.
    pub url: String,
    pub html_url: String,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeSearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchResult>,
}

/// Remaining/limit/reset for one rate-limit pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub reset: DateTime<Utc>,
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} (resets {})",
            self.remaining,
            self.limit,
            self.reset.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Snapshot of the two pools that matter here: code search and the core API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimits {
    pub core: Quota,
    pub search: Quota,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    resources: RateLimits,
}

#[derive(Deserialize)]
struct RepositoryDetails {
    #[serde(default)]
    archived: bool,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<Value>,
}

/// The remote operations the searcher and filters need.
#[async_trait]
pub trait CodeSearchClient: Send + Sync {
    /// Fetch one page (1-based) of code search results.
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage>;

    async fn rate_limit(&self) -> Result<RateLimits>;

    /// Raw bytes of the file behind a search result.
    async fn file_content(&self, result: &SearchResult) -> Result<Vec<u8>>;

    async fn repository_archived(&self, full_name: &str) -> Result<bool>;
}

/// reqwest backed client for github.com or a GitHub Enterprise API root.
pub struct GitHubClient {
    client: Client,
    token: String,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, base_url: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );

        let client = Client::builder()
            .user_agent(concat!("gh-code-search/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(GitHubClient {
            client,
            token: token.into(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str, accept: &'static str) -> RequestBuilder {
        debug!("Requesting URL: {}", url);
        self.client
            .get(url)
            .header(ACCEPT, accept)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(parse_api_error(status, &body))
    }
}

#[async_trait]
impl CodeSearchClient for GitHubClient {
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage> {
        let url = format!("{}/search/code", self.base_url);
        let request = self.get(&url, JSON_MEDIA_TYPE).query(&[
            ("q", query.to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ]);
        let page: CodeSearchPage = Self::send(request).await?.json().await?;
        Ok(page)
    }

    async fn rate_limit(&self) -> Result<RateLimits> {
        let url = format!("{}/rate_limit", self.base_url);
        let response: RateLimitResponse = Self::send(self.get(&url, JSON_MEDIA_TYPE))
            .await?
            .json()
            .await?;
        Ok(response.resources)
    }

    async fn file_content(&self, result: &SearchResult) -> Result<Vec<u8>> {
        let response = Self::send(self.get(&result.url, RAW_MEDIA_TYPE)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn repository_archived(&self, full_name: &str) -> Result<bool> {
        let url = format!("{}/repos/{}", self.base_url, full_name);
        let details: RepositoryDetails = Self::send(self.get(&url, JSON_MEDIA_TYPE))
            .await?
            .json()
            .await?;
        Ok(details.archived)
    }
}

/// Builds an [`SearchError::Api`] from a GitHub error response body.
///
/// Sub-errors are either objects with a `message` or bare strings; only the former
/// carry a message worth showing.
pub fn parse_api_error(status: u16, body: &str) -> SearchError {
    let (message, errors) = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let errors = parsed
                .errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            (parsed.message.unwrap_or_else(|| body.to_string()), errors)
        }
        Err(_) => (body.trim().to_string(), Vec::new()),
    };

    SearchError::Api {
        status,
        message,
        errors,
    }
}
