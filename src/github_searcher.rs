use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::{CodeSearchClient, CodeSearchPage, SearchResult};
use crate::error::{Result, SearchError};
use crate::filters::{self, Filter, Verdict};
use crate::progress::ProgressPrinter;
use crate::rate_limit::{Confirm, GuardOutcome, RateLimitGuard};

/// GitHub stops serving code search results past this many.
pub const MAX_SEARCH_RESULTS: u64 = 1000;

pub struct GitHubSearcher {
    client: Arc<dyn CodeSearchClient>,
    filters: Vec<Box<dyn Filter>>,
    confirm: Box<dyn Confirm>,
    verbose: bool,
}

impl GitHubSearcher {
    pub fn new(
        client: Arc<dyn CodeSearchClient>,
        filters: Vec<Box<dyn Filter>>,
        confirm: Box<dyn Confirm>,
        verbose: bool,
    ) -> Self {
        GitHubSearcher {
            client,
            filters,
            confirm,
            verbose,
        }
    }

    /// Search for the query terms and return the results every filter accepts.
    ///
    /// Progress goes to stderr. Results keep the order GitHub returned them in.
    pub async fn get_filtered_results(&self, query: &[String]) -> Result<Vec<SearchResult>> {
        let mut printer = ProgressPrinter::stderr(self.verbose);
        self.get_filtered_results_with(query, &mut printer).await
    }

    /// Same as [`get_filtered_results`](Self::get_filtered_results) with a caller
    /// supplied progress printer.
    pub async fn get_filtered_results_with<W: Write>(
        &self,
        query: &[String],
        printer: &mut ProgressPrinter<W>,
    ) -> Result<Vec<SearchResult>> {
        let query = query.join(" ");

        if self.verbose {
            self.print_rate_limits(printer).await;
        }

        let first_page = self
            .client
            .search_code(&query, 1)
            .await
            .map_err(SearchError::into_query_error)?;
        let total_count = first_page.total_count;
        info!("Found {} results for '{}'", total_count, query);

        let outcome = RateLimitGuard::new(self.client.as_ref(), self.confirm.as_ref())
            .check(total_count, filters::core_api_filter_count(&self.filters))
            .await?;
        if outcome == GuardOutcome::Disabled && self.verbose {
            printer.print("GH rate limiting is disabled, skipping rate limit check");
        }

        let truncated_at = AtomicU32::new(0);
        let mut results = result_stream(self.client.as_ref(), &query, first_page, &truncated_at);
        let mut kept = Vec::new();

        while let Some(result) = results.try_next().await? {
            let repo = result.repository.full_name.clone();
            printer.print(&format!("Checking result for {}", repo));

            match filters::evaluate(&self.filters, &result, self.client.as_ref()).await {
                Verdict::Included => kept.push(result),
                Verdict::Excluded(filter) => {
                    debug!("Excluded {} in {} via {}", result.path, repo, filter);
                    if self.verbose {
                        printer.print(&format!("Skipping result for {} via {}", repo, filter));
                    }
                }
                Verdict::Failed(e) => {
                    debug!("Could not filter {} in {}: {}", result.path, repo, e);
                    printer.force(&format!("Skipping result for {}: {}", repo, e));
                }
            }
        }

        let page = truncated_at.load(Ordering::Relaxed);
        if page > 0 {
            printer.force(&format!(
                "Reached search limit for '{}' at page {}, later results are not included",
                query, page
            ));
        }

        info!("{} of {} results kept", kept.len(), total_count);

        if self.verbose {
            self.print_rate_limits(printer).await;
        }

        Ok(kept)
    }

    async fn print_rate_limits<W: Write>(&self, printer: &mut ProgressPrinter<W>) {
        match self.client.rate_limit().await {
            Ok(limits) => printer.print(&format!(
                "GH Rate limits: search={}, core={}",
                limits.search, limits.core
            )),
            Err(e) => {
                debug!("Rate limit lookup failed: {}", e);
                printer.print("GH Rate limits: disabled");
            }
        }
    }
}

/// Pagination state behind the result stream.
struct Pager<'a> {
    client: &'a dyn CodeSearchClient,
    query: &'a str,
    next_page: u32,
    total_count: u64,
    fetched: u64,
    buffer: VecDeque<SearchResult>,
    exhausted: bool,
    /// Set to the page GitHub refused to serve, if any.
    truncated_at: &'a AtomicU32,
}

impl Pager<'_> {
    async fn fetch_next(&mut self) -> Result<()> {
        if self.fetched >= self.total_count.min(MAX_SEARCH_RESULTS) {
            if self.total_count > self.fetched {
                self.truncated_at.store(self.next_page, Ordering::Relaxed);
            }
            self.exhausted = true;
            return Ok(());
        }

        debug!("Fetching page {} for '{}'", self.next_page, self.query);
        match self.client.search_code(self.query, self.next_page).await {
            Ok(page) => {
                if page.items.is_empty() {
                    debug!("No more results for '{}'", self.query);
                    self.exhausted = true;
                }
                self.fetched += page.items.len() as u64;
                self.buffer.extend(page.items);
                self.next_page += 1;
                Ok(())
            }
            Err(e) if e.status() == Some(422) => {
                debug!("Page {} for '{}' refused: {}", self.next_page, self.query, e);
                self.truncated_at.store(self.next_page, Ordering::Relaxed);
                self.exhausted = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Streams results starting from an already fetched first page, requesting the
/// following pages as the consumer advances.
///
/// GitHub serves at most [`MAX_SEARCH_RESULTS`]; when the stream stops short of the
/// total count, the page it stopped at is stored in `truncated_at`.
fn result_stream<'a>(
    client: &'a dyn CodeSearchClient,
    query: &'a str,
    first_page: CodeSearchPage,
    truncated_at: &'a AtomicU32,
) -> BoxStream<'a, Result<SearchResult>> {
    let pager = Pager {
        client,
        query,
        next_page: 2,
        total_count: first_page.total_count,
        fetched: first_page.items.len() as u64,
        exhausted: first_page.items.is_empty(),
        buffer: first_page.items.into(),
        truncated_at,
    };

    stream::try_unfold(pager, |mut pager| async move {
        loop {
            if let Some(result) = pager.buffer.pop_front() {
                return Ok::<_, SearchError>(Some((result, pager)));
            }
            if pager.exhausted {
                return Ok(None);
            }
            pager.fetch_next().await?;
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{build_filters, FilterOptions};
    use crate::progress::ProgressMode;
    use crate::rate_limit::AutoConfirm;
    use crate::testing::{fixtures, MockApiError, MockClient};

    fn three_results() -> Vec<SearchResult> {
        vec![
            fixtures::search_result("org/repo1", "1.txt"),
            fixtures::search_result("org/repo1", "2.txt"),
            fixtures::search_result("org/repo2", "3.txt"),
        ]
    }

    fn query(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    fn searcher(client: &Arc<MockClient>, options: FilterOptions, verbose: bool) -> GitHubSearcher {
        GitHubSearcher::new(
            client.clone(),
            build_filters(&options).unwrap(),
            Box::new(AutoConfirm(true)),
            verbose,
        )
    }

    fn include_archived() -> FilterOptions {
        FilterOptions {
            include_archived: true,
            ..Default::default()
        }
    }

    async fn run(searcher: &GitHubSearcher, terms: &[&str]) -> (Result<Vec<SearchResult>>, String) {
        let mut buf = Vec::new();
        let result = {
            let mut printer = ProgressPrinter::new(&mut buf, ProgressMode::Append);
            searcher
                .get_filtered_results_with(&query(terms), &mut printer)
                .await
        };
        (result, String::from_utf8(buf).unwrap())
    }

    fn paths(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_joins_query_terms() {
        let client = Arc::new(MockClient::new());
        let searcher = searcher(&client, include_archived(), false);

        run(&searcher, &["name", "org:janeklb", "filename:setup.py"])
            .await
            .0
            .unwrap();

        let calls = client.search_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].query, "name org:janeklb filename:setup.py");
        assert_eq!(calls[0].page, 1);
    }

    #[tokio::test]
    async fn test_without_filters_keeps_stream_order() {
        let client = Arc::new(MockClient::new().with_results(three_results()));
        let searcher = searcher(&client, include_archived(), false);

        let (results, _) = run(&searcher, &["query", "org:bort"]).await;
        let results = results.unwrap();

        assert_eq!(paths(&results), vec!["1.txt", "2.txt", "3.txt"]);
        assert_eq!(results[0].repository.full_name, "org/repo1");
        assert_eq!(results[2].repository.full_name, "org/repo2");
        assert_eq!(client.rate_limit_calls(), 0);
    }

    #[tokio::test]
    async fn test_excludes_archived_repositories() {
        let client = Arc::new(
            MockClient::new()
                .with_results(three_results())
                .with_archived("org/repo2"),
        );
        let searcher = searcher(&client, FilterOptions::default(), false);

        let results = run(&searcher, &["query"]).await.0.unwrap();

        assert_eq!(paths(&results), vec!["1.txt", "2.txt"]);
        assert_eq!(client.archived_lookups().len(), 2);
        assert_eq!(client.rate_limit_calls(), 1);
    }

    #[tokio::test]
    async fn test_content_filter() {
        let client = Arc::new(
            MockClient::new()
                .with_results(three_results())
                .with_content("2.txt", b"some special content here"),
        );
        let options = FilterOptions {
            content_filter: Some("special content".into()),
            include_archived: true,
            ..Default::default()
        };
        let searcher = searcher(&client, options, false);

        let results = run(&searcher, &["query"]).await.0.unwrap();
        assert_eq!(paths(&results), vec!["2.txt"]);
    }

    #[tokio::test]
    async fn test_verbose_reports_excluding_filter() {
        let client = Arc::new(
            MockClient::new()
                .with_results(vec![
                    fixtures::search_result("org/repo1", "docs/1.txt"),
                    fixtures::search_result("org/repo1", "src/2.txt"),
                    fixtures::search_result("org/repo2", "src/3.txt"),
                ])
                .with_archived("org/repo2"),
        );
        let options = FilterOptions {
            path_filter: Some("src".into()),
            ..Default::default()
        };
        let searcher = searcher(&client, options, true);

        let (results, output) = run(&searcher, &["query"]).await;
        assert_eq!(paths(&results.unwrap()), vec!["src/2.txt"]);

        assert!(output.contains("Checking result for org/repo1\n"));
        assert!(output.contains("Skipping result for org/repo1 via path_filter\n"));
        assert!(output.contains("Skipping result for org/repo2 via not_archived_filter\n"));
        assert!(output.starts_with("GH Rate limits: search="));
        assert!(output.trim_end().lines().last().unwrap().starts_with("GH Rate limits:"));
        // path filter rejects docs/1.txt before the archived lookup runs
        assert_eq!(
            client.archived_lookups(),
            vec!["org/repo1".to_string(), "org/repo2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_quiet_mode_hides_exclusions() {
        let client = Arc::new(MockClient::new().with_results(three_results()));
        let options = FilterOptions {
            path_filter: Some("nothing".into()),
            include_archived: true,
            ..Default::default()
        };
        let searcher = searcher(&client, options, false);

        let (results, output) = run(&searcher, &["query"]).await;
        assert!(results.unwrap().is_empty());
        assert!(!output.contains("Skipping"));
    }

    #[tokio::test]
    async fn test_filter_failure_excludes_single_result() {
        let client = Arc::new(
            MockClient::new()
                .with_results(three_results())
                .with_content("1.txt", b"needle")
                .with_failing_content("2.txt")
                .with_content("3.txt", b"needle"),
        );
        let options = FilterOptions {
            content_filter: Some("needle".into()),
            include_archived: true,
            ..Default::default()
        };
        let searcher = searcher(&client, options, false);

        let (results, output) = run(&searcher, &["query"]).await;
        assert_eq!(paths(&results.unwrap()), vec!["1.txt", "3.txt"]);
        assert!(output.contains("Skipping result for org/repo1: content_filter: could not read 2.txt"));
    }

    #[tokio::test]
    async fn test_query_error_becomes_usage_error() {
        let client = Arc::new(MockClient::new().with_page_error(
            1,
            MockApiError::new(422, "Validation Failed")
                .with_errors(&["bad qualifier", "missing term"]),
        ));
        let searcher = searcher(&client, include_archived(), false);

        let err = run(&searcher, &["query"]).await.0.unwrap_err();
        assert!(err.is_usage());
        assert_eq!(
            err.to_string(),
            "Validation Failed (GitHub Exception): bad qualifier, missing term"
        );
    }

    #[tokio::test]
    async fn test_other_remote_errors_propagate() {
        let client = Arc::new(
            MockClient::new().with_page_error(1, MockApiError::new(503, "Service Unavailable")),
        );
        let searcher = searcher(&client, include_archived(), false);

        let err = run(&searcher, &["query"]).await.0.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_zero_results() {
        let client = Arc::new(MockClient::new());
        let searcher = searcher(&client, FilterOptions::default(), false);

        let results = run(&searcher, &["query"]).await.0.unwrap();
        assert!(results.is_empty());
        assert_eq!(client.rate_limit_calls(), 0);
        assert!(client.archived_lookups().is_empty());
    }

    #[tokio::test]
    async fn test_fetches_following_pages() {
        let results: Vec<SearchResult> = (0..5)
            .map(|i| fixtures::search_result("org/repo1", &format!("{i}.txt")))
            .collect();
        let client = Arc::new(MockClient::new().with_results(results).with_per_page(2));
        let searcher = searcher(&client, include_archived(), false);

        let results = run(&searcher, &["query"]).await.0.unwrap();
        assert_eq!(results.len(), 5);
        let pages: Vec<u32> = client.search_calls().iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_422_on_later_page_ends_stream() {
        let results: Vec<SearchResult> = (0..4)
            .map(|i| fixtures::search_result("org/repo1", &format!("{i}.txt")))
            .collect();
        let client = Arc::new(
            MockClient::new()
                .with_results(results)
                .with_per_page(2)
                .with_page_error(2, MockApiError::new(422, "Only the first 1000 results")),
        );
        let searcher = searcher(&client, include_archived(), false);

        let (results, output) = run(&searcher, &["query"]).await;
        assert_eq!(paths(&results.unwrap()), vec!["0.txt", "1.txt"]);
        assert!(output.contains(
            "Reached search limit for 'query' at page 2, later results are not included\n"
        ));
    }

    #[tokio::test]
    async fn test_stops_at_search_result_cap() {
        let results: Vec<SearchResult> = (0..1200)
            .map(|i| fixtures::search_result("org/repo1", &format!("{i}.txt")))
            .collect();
        let client = Arc::new(MockClient::new().with_results(results));
        let searcher = searcher(&client, include_archived(), false);

        let (results, output) = run(&searcher, &["query"]).await;
        let results = results.unwrap();

        assert_eq!(results.len(), 1000);
        assert_eq!(results.last().unwrap().path, "999.txt");
        let pages: Vec<u32> = client.search_calls().iter().map(|c| c.page).collect();
        assert_eq!(pages, (1..=10).collect::<Vec<u32>>());
        assert!(output.contains("Reached search limit for 'query' at page 11"));
    }

    #[tokio::test]
    async fn test_complete_result_set_is_not_reported_as_truncated() {
        let client = Arc::new(MockClient::new().with_results(three_results()));
        let searcher = searcher(&client, include_archived(), false);

        let (_, output) = run(&searcher, &["query"]).await;
        assert!(!output.contains("Reached search limit"));
    }

    #[tokio::test]
    async fn test_guard_uses_reported_total_count() {
        // 600 reported results cost 600 archived lookups in the worst case, even though
        // only three come back.
        let client = Arc::new(
            MockClient::new()
                .with_results(three_results())
                .with_total_count(600),
        );
        let searcher = GitHubSearcher::new(
            client.clone(),
            build_filters(&FilterOptions::default()).unwrap(),
            Box::new(AutoConfirm(false)),
            false,
        );

        let err = run(&searcher, &["query"]).await.0.unwrap_err();
        assert!(matches!(err, SearchError::Aborted));
        assert_eq!(client.rate_limit_calls(), 1);
        assert!(client.archived_lookups().is_empty());
    }

    #[tokio::test]
    async fn test_declined_confirmation_aborts_before_filtering() {
        let client = Arc::new(
            MockClient::new()
                .with_results(three_results())
                .with_rate_limits(fixtures::rate_limits(3, 5000)),
        );
        let searcher = GitHubSearcher::new(
            client.clone(),
            build_filters(&FilterOptions::default()).unwrap(),
            Box::new(AutoConfirm(false)),
            false,
        );

        let err = run(&searcher, &["query"]).await.0.unwrap_err();
        assert!(matches!(err, SearchError::Aborted));
        assert!(client.archived_lookups().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limiting_disabled_is_noted_in_verbose_mode() {
        let client = Arc::new(
            MockClient::new()
                .with_results(three_results())
                .without_rate_limits(),
        );
        let searcher = searcher(&client, FilterOptions::default(), true);

        let (results, output) = run(&searcher, &["query"]).await;
        assert_eq!(results.unwrap().len(), 3);
        assert!(output.starts_with("GH Rate limits: disabled\n"));
        assert!(output.contains("GH rate limiting is disabled, skipping rate limit check\n"));
    }
}
