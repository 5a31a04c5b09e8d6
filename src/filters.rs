//! Client-side filters applied to each code search result.
//!
//! Filters run in a fixed order and the first one that rejects a result wins. Filters
//! that need an extra API call per result report it through
//! [`Filter::uses_core_api`] so the rate-limit guard can estimate the cost of a run.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::client::{CodeSearchClient, SearchResult};
use crate::error::{FilterError, Result, SearchError};

#[async_trait]
pub trait Filter: Send + Sync {
    /// Identifies the filter in exclusion diagnostics.
    fn name(&self) -> &str;

    /// Whether evaluating this filter calls the core API.
    fn uses_core_api(&self) -> bool;

    async fn matches(
        &self,
        result: &SearchResult,
        client: &dyn CodeSearchClient,
    ) -> std::result::Result<bool, FilterError>;
}

/// Outcome of running a result through the filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Included,
    /// Rejected by the named filter.
    Excluded(String),
    /// A filter could not evaluate the result.
    Failed(FilterError),
}

/// Runs the chain in order, stopping at the first rejection or failure.
pub async fn evaluate(
    filters: &[Box<dyn Filter>],
    result: &SearchResult,
    client: &dyn CodeSearchClient,
) -> Verdict {
    for filter in filters {
        match filter.matches(result, client).await {
            Ok(true) => continue,
            Ok(false) => return Verdict::Excluded(filter.name().to_string()),
            Err(e) => return Verdict::Failed(e),
        }
    }
    Verdict::Included
}

/// Number of filters that cost a core API call per result.
pub fn core_api_filter_count(filters: &[Box<dyn Filter>]) -> u64 {
    filters.iter().filter(|f| f.uses_core_api()).count() as u64
}

/// Keeps results whose path contains a substring.
pub struct PathFilter {
    needle: String,
}

impl PathFilter {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

#[async_trait]
impl Filter for PathFilter {
    fn name(&self) -> &str {
        "path_filter"
    }

    fn uses_core_api(&self) -> bool {
        false
    }

    async fn matches(
        &self,
        result: &SearchResult,
        _client: &dyn CodeSearchClient,
    ) -> std::result::Result<bool, FilterError> {
        Ok(result.path.contains(&self.needle))
    }
}

async fn fetch_text(
    filter: &str,
    result: &SearchResult,
    client: &dyn CodeSearchClient,
) -> std::result::Result<String, FilterError> {
    let bytes = client.file_content(result).await.map_err(|e| {
        FilterError::new(
            filter,
            format!(
                "could not read {} in {}: {}",
                result.path, result.repository.full_name, e
            ),
        )
    })?;

    String::from_utf8(bytes).map_err(|_| {
        FilterError::new(
            filter,
            format!(
                "{} in {} is not valid UTF-8",
                result.path, result.repository.full_name
            ),
        )
    })
}

/// Keeps results whose decoded content contains a substring.
pub struct ContentFilter {
    needle: String,
}

impl ContentFilter {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

#[async_trait]
impl Filter for ContentFilter {
    fn name(&self) -> &str {
        "content_filter"
    }

    fn uses_core_api(&self) -> bool {
        true
    }

    async fn matches(
        &self,
        result: &SearchResult,
        client: &dyn CodeSearchClient,
    ) -> std::result::Result<bool, FilterError> {
        let content = fetch_text(self.name(), result, client).await?;
        Ok(content.contains(&self.needle))
    }
}

/// Keeps results whose decoded content matches a regular expression.
pub struct RegexContentFilter {
    pattern: Regex,
}

impl RegexContentFilter {
    /// Compiles `pattern`; an invalid pattern is a usage error.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            SearchError::usage(format!(
                "Invalid regex content filter '{}': {}",
                pattern, e
            ))
        })?;
        Ok(Self { pattern })
    }
}

#[async_trait]
impl Filter for RegexContentFilter {
    fn name(&self) -> &str {
        "regex_content_filter"
    }

    fn uses_core_api(&self) -> bool {
        true
    }

    async fn matches(
        &self,
        result: &SearchResult,
        client: &dyn CodeSearchClient,
    ) -> std::result::Result<bool, FilterError> {
        let content = fetch_text(self.name(), result, client).await?;
        Ok(self.pattern.is_match(&content))
    }
}

/// Drops results from archived repositories.
///
/// The archived flag is looked up once per repository and cached for the lifetime of
/// the filter, since a search usually returns many files from the same repository. A
/// failed lookup is cached as well and reported again for every later result.
#[derive(Default)]
pub struct NotArchivedFilter {
    cache: Mutex<HashMap<String, std::result::Result<bool, FilterError>>>,
}

impl NotArchivedFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, full_name: &str) -> Option<std::result::Result<bool, FilterError>> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(full_name).cloned())
    }
}

#[async_trait]
impl Filter for NotArchivedFilter {
    fn name(&self) -> &str {
        "not_archived_filter"
    }

    fn uses_core_api(&self) -> bool {
        true
    }

    async fn matches(
        &self,
        result: &SearchResult,
        client: &dyn CodeSearchClient,
    ) -> std::result::Result<bool, FilterError> {
        let full_name = &result.repository.full_name;
        if let Some(archived) = self.cached(full_name) {
            return archived.map(|archived| !archived);
        }

        let archived = client.repository_archived(full_name).await.map_err(|e| {
            FilterError::new(
                self.name(),
                format!("could not look up {}: {}", full_name, e),
            )
        });
        debug!("Repository {} archived: {:?}", full_name, archived);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(full_name.clone(), archived.clone());
        }
        archived.map(|archived| !archived)
    }
}

/// Filter parameters as supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub path_filter: Option<String>,
    pub content_filter: Option<String>,
    pub regex_content_filter: Option<String>,
    pub include_archived: bool,
}

/// Builds the filter chain: path, not-archived, content, regex content.
///
/// Fails before any network traffic if the regex does not compile.
pub fn build_filters(options: &FilterOptions) -> Result<Vec<Box<dyn Filter>>> {
    let mut filters: Vec<Box<dyn Filter>> = Vec::new();

    if let Some(path) = options.path_filter.as_deref().filter(|p| !p.is_empty()) {
        filters.push(Box::new(PathFilter::new(path)));
    }
    if !options.include_archived {
        filters.push(Box::new(NotArchivedFilter::new()));
    }
    if let Some(content) = options.content_filter.as_deref().filter(|c| !c.is_empty()) {
        filters.push(Box::new(ContentFilter::new(content)));
    }
    if let Some(pattern) = options
        .regex_content_filter
        .as_deref()
        .filter(|r| !r.is_empty())
    {
        filters.push(Box::new(RegexContentFilter::new(pattern)?));
    }

    Ok(filters)
}
