use clap::Parser;
use std::env;

use crate::error::{Result, SearchError};
use crate::filters::FilterOptions;
use crate::output::OutputFormat;

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const API_URL_ENV: &str = "GITHUB_API_URL";

/// Search code on GitHub from the command line, with filters GitHub's own search
/// does not offer.
///
/// QUERY must contain at least one search term, but may also contain search qualifiers
/// (https://docs.github.com/en/search-github/searching-on-github/searching-code).
#[derive(Parser, Debug)]
#[clap(author, version, about, max_term_width = 120)]
pub struct Args {
    /// Search terms and qualifiers.
    #[clap(value_name = "QUERY", num_args = 1.., required = true)]
    pub query: Vec<String>,

    /// GitHub Auth Token. Falls back on the GITHUB_TOKEN envvar.
    #[clap(long)]
    pub github_token: Option<String>,

    /// Override the default GitHub API URL. Falls back on the GITHUB_API_URL envvar.
    #[clap(long)]
    pub github_api_url: Option<String>,

    /// Exclude results whose path (or part of path) does not match this.
    #[clap(short, long)]
    pub path_filter: Option<String>,

    /// Exclude results whose content does not match this.
    #[clap(short, long)]
    pub content_filter: Option<String>,

    /// Exclude results whose content does not match this regular expression.
    #[clap(short, long, value_name = "REGEX")]
    pub regex_content_filter: Option<String>,

    /// Include results from archived repos.
    #[clap(short = 'a', long)]
    pub include_archived: bool,

    /// Only the names of repos are printed. Same as --format repo-list.
    #[clap(short = 'l', long)]
    pub repos_with_matches: bool,

    /// Output format.
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Default)]
    pub format: OutputFormat,

    /// Do not ask for confirmation when filtering could use up the rate limit.
    #[clap(short, long)]
    pub yes: bool,

    /// Verbose output.
    #[clap(short, long)]
    pub verbose: bool,
}

/// Settings for one run, after environment fallback.
#[derive(Debug, Clone)]
pub struct Config {
    pub query: Vec<String>,
    pub token: String,
    pub api_url: Option<String>,
    pub filters: FilterOptions,
    pub format: OutputFormat,
    pub assume_yes: bool,
    pub verbose: bool,
}

impl Config {
    /// Resolves the token and API URL from the environment when not given as options.
    pub fn from_args(args: Args) -> Result<Self> {
        Self::resolve(args, |name| env::var(name).ok())
    }

    fn resolve(args: Args, env_var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = non_blank(args.github_token)
            .or_else(|| non_blank(env_var(TOKEN_ENV)))
            .ok_or_else(|| {
                SearchError::usage(format!(
                    "GitHub token must be set via --github-token option or {} envvar.",
                    TOKEN_ENV
                ))
            })?;
        let api_url = non_blank(args.github_api_url).or_else(|| non_blank(env_var(API_URL_ENV)));

        let format = if args.repos_with_matches {
            OutputFormat::RepoList
        } else {
            args.format
        };

        Ok(Config {
            query: args.query,
            token,
            api_url,
            filters: FilterOptions {
                path_filter: args.path_filter,
                content_filter: args.content_filter,
                regex_content_filter: args.regex_content_filter,
                include_archived: args.include_archived,
            },
            format,
            assume_yes: args.yes,
            verbose: args.verbose,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
