//! # gh-code-search
//!
//! Search code on GitHub from the command line, then narrow the results down with
//! filters GitHub's code search does not offer: path substrings, file content
//! (plain or regex), and excluding archived repositories.
//!
//! ## Main Components
//!
//! - [`GitHubSearcher`]: runs the search, checks the rate limit and applies the filters
//! - [`Filter`]: a predicate over one search result, see [`filters`]
//! - [`RateLimitGuard`]: asks before a run that could exhaust the core API quota
//! - [`ProgressPrinter`]: status line shown while results are filtered
//! - [`OutputFormat`]: how the surviving results are printed
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gh_code_search::{build_filters, AutoConfirm, FilterOptions, GitHubClient, GitHubSearcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gh_code_search::SearchError> {
//!     let client = Arc::new(GitHubClient::new("ghp_token", None)?);
//!     let filters = build_filters(&FilterOptions {
//!         path_filter: Some("Cargo.toml".to_string()),
//!         ..Default::default()
//!     })?;
//!
//!     let searcher = GitHubSearcher::new(client, filters, Box::new(AutoConfirm(true)), false);
//!     let query = vec!["tokio".to_string(), "org:rust-lang".to_string()];
//!     for result in searcher.get_filtered_results(&query).await? {
//!         println!("{} {}", result.repository.full_name, result.path);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod app;
mod args;
pub mod client;
pub mod error;
pub mod filters;
mod github_searcher;
pub mod output;
pub mod progress;
pub mod rate_limit;
pub mod testing;

pub use crate::app::{build_searcher, run, run_with};
pub use crate::args::{Args, Config};
pub use crate::client::{CodeSearchClient, GitHubClient, RateLimits, SearchResult};
pub use crate::error::{FilterError, Result, SearchError};
pub use crate::filters::{build_filters, Filter, FilterOptions, Verdict};
pub use crate::github_searcher::GitHubSearcher;
pub use crate::output::OutputFormat;
pub use crate::progress::{ProgressMode, ProgressPrinter};
pub use crate::rate_limit::{AutoConfirm, Confirm, RateLimitGuard, TerminalConfirm};
