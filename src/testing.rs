//! Mock client and fixtures for exercising the search pipeline without GitHub.
//!
//! # Example
//!
//! ```rust,ignore
//! use gh_code_search::testing::{fixtures, MockClient};
//!
//! let client = MockClient::new()
//!     .with_results(vec![
//!         fixtures::search_result("org/repo1", "README.md"),
//!         fixtures::search_result("org/repo2", "src/lib.rs"),
//!     ])
//!     .with_archived("org/repo2");
//!
//! // Hand it to a GitHubSearcher, then inspect what was called.
//! assert_eq!(client.search_calls().len(), 0);
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::client::{CodeSearchClient, CodeSearchPage, RateLimits, SearchResult, PER_PAGE};
use crate::error::{Result, SearchError};

/// Test fixtures.
pub mod fixtures {
    use chrono::{TimeZone, Utc};

    use crate::client::{Owner, Quota, RateLimits, Repository, SearchResult};

    /// A search result for `path` in repository `full_name` (`owner/name`).
    pub fn search_result(full_name: &str, path: &str) -> SearchResult {
        let (owner, name) = full_name.split_once('/').unwrap_or(("", full_name));
        let file_name = path.rsplit('/').next().unwrap_or(path);
        SearchResult {
            name: file_name.to_string(),
            path: path.to_string(),
            sha: "0123abcd".to_string(),
            url: format!("https://api.github.com/repos/{full_name}/contents/{path}?ref=0123abcd"),
            html_url: format!("https://www.github.com/{full_name}/blob/master/{path}"),
            repository: Repository {
                full_name: full_name.to_string(),
                name: name.to_string(),
                html_url: format!("https://www.github.com/{full_name}"),
                fork: false,
                owner: Owner {
                    login: owner.to_string(),
                },
            },
        }
    }

    pub fn quota(remaining: u64, limit: u64) -> Quota {
        Quota {
            limit,
            remaining,
            reset: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    /// Rate limits with the given core pool and a fresh search pool.
    pub fn rate_limits(core_remaining: u64, core_limit: u64) -> RateLimits {
        RateLimits {
            core: quota(core_remaining, core_limit),
            search: quota(30, 30),
        }
    }
}

/// A recorded search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    pub query: String,
    pub page: u32,
}

/// How a configured API failure should look.
#[derive(Debug, Clone)]
pub struct MockApiError {
    pub status: u16,
    pub message: String,
    pub errors: Vec<String>,
}

impl MockApiError {
    pub fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: &[&str]) -> Self {
        self.errors = errors.iter().map(|e| e.to_string()).collect();
        self
    }

    fn to_error(&self) -> SearchError {
        SearchError::Api {
            status: self.status,
            message: self.message.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// In-memory implementation of [`CodeSearchClient`].
///
/// Results are served in pages of `per_page` items. Every call is recorded so tests
/// can assert on how often the expensive endpoints were hit.
#[derive(Debug)]
pub struct MockClient {
    results: Vec<SearchResult>,
    total_count: Option<u64>,
    per_page: usize,
    page_errors: HashMap<u32, MockApiError>,
    contents: HashMap<String, Vec<u8>>,
    failing_contents: HashSet<String>,
    archived: HashSet<String>,
    failing_repositories: HashSet<String>,
    rate_limits: Option<RateLimits>,
    searches: Mutex<Vec<RecordedSearch>>,
    rate_limit_calls: Mutex<usize>,
    archived_lookups: Mutex<Vec<String>>,
    content_fetches: Mutex<Vec<String>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            total_count: None,
            per_page: PER_PAGE as usize,
            page_errors: HashMap::new(),
            contents: HashMap::new(),
            failing_contents: HashSet::new(),
            archived: HashSet::new(),
            failing_repositories: HashSet::new(),
            rate_limits: Some(fixtures::rate_limits(5000, 5000)),
            searches: Mutex::new(Vec::new()),
            rate_limit_calls: Mutex::new(0),
            archived_lookups: Mutex::new(Vec::new()),
            content_fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = results;
        self
    }

    /// Report a total count different from the number of configured results.
    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = Some(total_count);
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Fail the request for `page` (1-based).
    pub fn with_page_error(mut self, page: u32, error: MockApiError) -> Self {
        self.page_errors.insert(page, error);
        self
    }

    /// File content keyed by result path.
    pub fn with_content(mut self, path: &str, content: &[u8]) -> Self {
        self.contents.insert(path.to_string(), content.to_vec());
        self
    }

    /// Make the content fetch for `path` fail with a 500.
    pub fn with_failing_content(mut self, path: &str) -> Self {
        self.failing_contents.insert(path.to_string());
        self
    }

    pub fn with_archived(mut self, full_name: &str) -> Self {
        self.archived.insert(full_name.to_string());
        self
    }

    /// Make the archived lookup for `full_name` fail with a 404.
    pub fn with_failing_repository(mut self, full_name: &str) -> Self {
        self.failing_repositories.insert(full_name.to_string());
        self
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = Some(rate_limits);
        self
    }

    /// Behave like a GitHub Enterprise server with rate limiting turned off.
    pub fn without_rate_limits(mut self) -> Self {
        self.rate_limits = None;
        self
    }

    pub fn search_calls(&self) -> Vec<RecordedSearch> {
        self.searches.lock().unwrap().clone()
    }

    pub fn rate_limit_calls(&self) -> usize {
        *self.rate_limit_calls.lock().unwrap()
    }

    pub fn archived_lookups(&self) -> Vec<String> {
        self.archived_lookups.lock().unwrap().clone()
    }

    pub fn content_fetches(&self) -> Vec<String> {
        self.content_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeSearchClient for MockClient {
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage> {
        self.searches.lock().unwrap().push(RecordedSearch {
            query: query.to_string(),
            page,
        });

        if let Some(error) = self.page_errors.get(&page) {
            return Err(error.to_error());
        }

        let start = (page.saturating_sub(1) as usize) * self.per_page;
        let items = self
            .results
            .iter()
            .skip(start)
            .take(self.per_page)
            .cloned()
            .collect();

        Ok(CodeSearchPage {
            total_count: self.total_count.unwrap_or(self.results.len() as u64),
            items,
        })
    }

    async fn rate_limit(&self) -> Result<RateLimits> {
        *self.rate_limit_calls.lock().unwrap() += 1;
        self.rate_limits
            .ok_or_else(|| MockApiError::new(404, "Rate limiting is not enabled.").to_error())
    }

    async fn file_content(&self, result: &SearchResult) -> Result<Vec<u8>> {
        self.content_fetches.lock().unwrap().push(result.path.clone());
        if self.failing_contents.contains(&result.path) {
            return Err(MockApiError::new(500, "Server Error").to_error());
        }
        Ok(self.contents.get(&result.path).cloned().unwrap_or_default())
    }

    async fn repository_archived(&self, full_name: &str) -> Result<bool> {
        self.archived_lookups
            .lock()
            .unwrap()
            .push(full_name.to_string());
        if self.failing_repositories.contains(full_name) {
            return Err(MockApiError::new(404, "Not Found").to_error());
        }
        Ok(self.archived.contains(full_name))
    }
}
