use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::io::Write;

use crate::client::{Repository, SearchResult};
use crate::error::Result;

const NO_RESULTS_HINT: &str = "(For limitations of GitHub's code search see https://docs.github.com/en/github/searching-for-information-on-github/searching-code#considerations-for-code-search)";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Results grouped per repository with links to the repository search page
    #[default]
    Default,
    /// Only the names of repositories with matches
    RepoList,
    Json,
    Yaml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            OutputFormat::Default => "default",
            OutputFormat::RepoList => "repo-list",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        };
        write!(f, "{}", value)
    }
}

/// Results of one repository, sorted by path.
struct RepoGroup<'a> {
    repository: &'a Repository,
    results: Vec<&'a SearchResult>,
}

/// Groups by repository in the order the repositories were first seen.
fn group_by_repo(results: &[SearchResult]) -> Vec<RepoGroup<'_>> {
    let mut groups: Vec<RepoGroup<'_>> = Vec::new();
    for result in results {
        match groups
            .iter_mut()
            .find(|g| g.repository.full_name == result.repository.full_name)
        {
            Some(group) => group.results.push(result),
            None => groups.push(RepoGroup {
                repository: &result.repository,
                results: vec![result],
            }),
        }
    }

    for group in &mut groups {
        group.results.sort_by(|a, b| a.path.cmp(&b.path));
    }
    groups
}

/// Groups with more results first; ties keep first-seen order.
fn by_result_count(mut groups: Vec<RepoGroup<'_>>) -> Vec<RepoGroup<'_>> {
    groups.sort_by(|a, b| b.results.len().cmp(&a.results.len()));
    groups
}

/// Drops `repo:` and `org:` qualifiers, which the per-repository search page rejects.
fn sanitize_qualifiers(query: &[String]) -> Vec<&str> {
    query
        .iter()
        .map(String::as_str)
        .filter(|q| !(q.starts_with("repo:") || q.starts_with("org:")))
        .collect()
}

fn repo_search_url(repository: &Repository, query: &[String]) -> String {
    let q = urlencoding::encode(&sanitize_qualifiers(query).join(" ")).into_owned();
    format!("{}/search?utf8=✓&q={}", repository.html_url, q)
}

#[derive(Serialize)]
struct RepoView<'a> {
    fork: bool,
    full_name: &'a str,
    html_url: &'a str,
    name: &'a str,
    owner: &'a str,
    results: Vec<ResultView<'a>>,
}

#[derive(Serialize)]
struct ResultView<'a> {
    html_url: &'a str,
    name: &'a str,
    path: &'a str,
    sha: &'a str,
}

fn views<'a>(groups: &[RepoGroup<'a>]) -> Vec<RepoView<'a>> {
    groups
        .iter()
        .map(|group| RepoView {
            fork: group.repository.fork,
            full_name: &group.repository.full_name,
            html_url: &group.repository.html_url,
            name: &group.repository.name,
            owner: &group.repository.owner.login,
            results: group
                .results
                .iter()
                .map(|r| ResultView {
                    html_url: &r.html_url,
                    name: &r.name,
                    path: &r.path,
                    sha: &r.sha,
                })
                .collect(),
        })
        .collect()
}

/// Writes `results` for `query` in the given format.
pub fn render<W: Write>(
    format: OutputFormat,
    query: &[String],
    results: &[SearchResult],
    out: &mut W,
) -> Result<()> {
    let groups = match format {
        OutputFormat::RepoList => group_by_repo(results),
        _ => by_result_count(group_by_repo(results)),
    };

    match format {
        OutputFormat::Default => {
            if groups.is_empty() {
                writeln!(out, "No results!")?;
                writeln!(out, "{}", NO_RESULTS_HINT)?;
                return Ok(());
            }
            writeln!(out, "Results:")?;
            for group in &groups {
                writeln!(
                    out,
                    " {} - {}: {}",
                    group.results.len(),
                    group.repository.full_name,
                    repo_search_url(group.repository, query)
                )?;
                for result in &group.results {
                    writeln!(out, "\t- {}", result.path)?;
                }
            }
        }
        OutputFormat::RepoList => {
            for group in &groups {
                writeln!(out, "{}", group.repository.full_name)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &views(&groups))?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => {
            serde_yaml::to_writer(&mut *out, &views(&groups))?;
        }
    }

    Ok(())
}
