use std::io::{self, Write};
use std::sync::Arc;
use tracing::debug;

use crate::args::Config;
use crate::client::{CodeSearchClient, GitHubClient};
use crate::error::{Result, SearchError};
use crate::filters::build_filters;
use crate::github_searcher::GitHubSearcher;
use crate::output::render;
use crate::progress::ProgressPrinter;
use crate::rate_limit::{AutoConfirm, Confirm, TerminalConfirm};

/// Runs one search against GitHub and prints the results to stdout.
pub async fn run(config: Config) -> Result<()> {
    let client = Arc::new(GitHubClient::new(&config.token, config.api_url.as_deref())?);
    debug!("Using GitHub API at {}", client.base_url());

    let confirm: Box<dyn Confirm> = if config.assume_yes {
        Box::new(AutoConfirm(true))
    } else {
        Box::new(TerminalConfirm)
    };
    let searcher = build_searcher(&config, client, confirm)?;

    let printer = ProgressPrinter::stderr(config.verbose);
    let mut stdout = io::stdout().lock();
    run_with(&config, &searcher, printer, &mut stdout).await
}

/// Runs the search and renders the results into `out`.
///
/// The progress printer is dropped, restoring the terminal, before anything is
/// rendered.
pub async fn run_with<P: Write, W: Write>(
    config: &Config,
    searcher: &GitHubSearcher,
    mut printer: ProgressPrinter<P>,
    out: &mut W,
) -> Result<()> {
    let results = searcher
        .get_filtered_results_with(&config.query, &mut printer)
        .await;
    drop(printer);
    let results = results.map_err(SearchError::into_credentials_error)?;

    render(config.format, &config.query, &results, out)?;
    out.flush()?;
    Ok(())
}

/// Builds the filter chain for `config` and a searcher on top of `client`.
///
/// An invalid regex filter fails here, before any request is made.
pub fn build_searcher(
    config: &Config,
    client: Arc<dyn CodeSearchClient>,
    confirm: Box<dyn Confirm>,
) -> Result<GitHubSearcher> {
    let filters = build_filters(&config.filters)?;
    Ok(GitHubSearcher::new(client, filters, confirm, config.verbose))
}
