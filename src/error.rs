//! Error types for gh-code-search.
//!
//! [`SearchError`] is what a run can fail with. [`FilterError`] is narrower: it means a
//! single result could not be evaluated, and the searcher recovers from it by excluding
//! that result.

use thiserror::Error;

/// Everything that can stop a search run.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Bad input from the user: credentials, filter patterns or query syntax.
    #[error("{0}")]
    Usage(String),

    /// The user declined a rate-limit confirmation.
    #[error("Aborted!")]
    Aborted,

    /// The GitHub API answered with a non-success status.
    #[error("GitHub API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        errors: Vec<String>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    pub fn usage(message: impl Into<String>) -> Self {
        SearchError::Usage(message.into())
    }

    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, SearchError::Usage(_))
    }

    /// Process exit code: 2 for usage errors, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        if self.is_usage() {
            2
        } else {
            1
        }
    }

    /// Rewrites a 422 from the search endpoint into a usage error.
    ///
    /// GitHub reports query syntax problems as 422 with a top level message and a list
    /// of sub-errors; the sub-error messages are joined with `", "`.
    pub fn into_query_error(self) -> Self {
        match self {
            SearchError::Api {
                status: 422,
                message,
                errors,
            } => SearchError::Usage(format!(
                "{} (GitHub Exception): {}",
                message,
                errors.join(", ")
            )),
            other => other,
        }
    }

    /// Rewrites a 401 into the usage error shown for bad credentials.
    pub fn into_credentials_error(self) -> Self {
        match self {
            SearchError::Api {
                status: 401,
                message,
                ..
            } => SearchError::Usage(format!("Bad Credentials: 401 \"{}\"", message)),
            other => other,
        }
    }
}

/// A single result could not be evaluated by a filter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{filter}: {message}")]
pub struct FilterError {
    /// Name of the filter that failed.
    pub filter: String,
    pub message: String,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
