use clap::Parser;
use dotenv::dotenv;
use gh_code_search::{run, Args, Config, SearchError};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Used when RUST_LOG is unset: debug logs for this crate with --verbose, warnings
/// otherwise.
fn default_log_directive(verbose: bool) -> &'static str {
    if verbose {
        "gh_code_search=debug"
    } else {
        "warn"
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(default_log_directive(args.verbose))
        }))
        .init();

    let result = match Config::from_args(args) {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(SearchError::Aborted) => {
            eprintln!("Aborted!");
            ExitCode::from(SearchError::Aborted.exit_code())
        }
        Err(e) => {
            if !e.is_usage() {
                error!("Search failed: {:?}", e);
            }
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
