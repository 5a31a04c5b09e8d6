//! Pre-flight check of the core API quota before running expensive filters.

use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm as ConfirmPrompt;
use tracing::{debug, info, warn};

use crate::client::{CodeSearchClient, Quota};
use crate::error::{Result, SearchError};

/// Confirm when less than this share of the core quota would be left.
pub const NEAR_LIMIT_RATIO: f64 = 0.10;

/// Confirm when a run could make more core API calls than this.
pub const MANY_CALLS_THRESHOLD: u64 = 500;

/// Asks the user whether to go ahead.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Interactive yes/no prompt on the terminal. Defaults to no.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        ConfirmPrompt::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// Answers every prompt the same way.
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// What the guard concluded for a given quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Proceed,
    /// The run could leave less than [`NEAR_LIMIT_RATIO`] of the core quota.
    NearLimit { worst_case_calls: u64, remaining: u64 },
    /// The run could make more than [`MANY_CALLS_THRESHOLD`] calls.
    ManyCalls { worst_case_calls: u64 },
}

impl Assessment {
    pub fn needs_confirmation(&self) -> bool {
        !matches!(self, Assessment::Proceed)
    }

    fn prompt(&self) -> String {
        match self {
            Assessment::Proceed => String::new(),
            Assessment::NearLimit {
                worst_case_calls,
                remaining,
            } => format!(
                "Filtering could make up to {} API calls with only {} remaining. Continue?",
                worst_case_calls, remaining
            ),
            Assessment::ManyCalls { worst_case_calls } => format!(
                "Filtering could make up to {} API calls. Continue?",
                worst_case_calls
            ),
        }
    }
}

/// How the check ended when the run is allowed to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// No filter needs the core API; nothing was fetched.
    Skipped,
    /// The server does not report rate limits.
    Disabled,
    /// Quota was checked; `confirmed` is true if the user had to agree.
    Checked { confirmed: bool },
}

pub fn worst_case_calls(total_results: u64, core_api_filters: u64) -> u64 {
    total_results.saturating_mul(core_api_filters)
}

/// Near-limit is checked first; many-calls only when near-limit does not apply.
pub fn assess(worst_case_calls: u64, core: &Quota) -> Assessment {
    let left = core.remaining as f64 - worst_case_calls as f64;
    if left / (core.limit as f64) < NEAR_LIMIT_RATIO {
        Assessment::NearLimit {
            worst_case_calls,
            remaining: core.remaining,
        }
    } else if worst_case_calls > MANY_CALLS_THRESHOLD {
        Assessment::ManyCalls { worst_case_calls }
    } else {
        Assessment::Proceed
    }
}

/// Fetches the core quota and asks for confirmation when the run looks costly.
pub struct RateLimitGuard<'a> {
    client: &'a dyn CodeSearchClient,
    confirm: &'a dyn Confirm,
}

impl<'a> RateLimitGuard<'a> {
    pub fn new(client: &'a dyn CodeSearchClient, confirm: &'a dyn Confirm) -> Self {
        Self { client, confirm }
    }

    /// Returns [`SearchError::Aborted`] if the user declines.
    pub async fn check(&self, total_results: u64, core_api_filters: u64) -> Result<GuardOutcome> {
        let worst_case = worst_case_calls(total_results, core_api_filters);
        if worst_case == 0 {
            debug!("No filter uses the core API, skipping rate limit check");
            return Ok(GuardOutcome::Skipped);
        }

        let limits = match self.client.rate_limit().await {
            Ok(limits) => limits,
            Err(e) => {
                info!("Rate limit lookup failed, assuming it is disabled: {}", e);
                return Ok(GuardOutcome::Disabled);
            }
        };
        if limits.core.limit == 0 {
            info!("Core rate limit is 0, assuming it is disabled");
            return Ok(GuardOutcome::Disabled);
        }

        let assessment = assess(worst_case, &limits.core);
        debug!(
            "Worst case {} core API calls against {}: {:?}",
            worst_case, limits.core, assessment
        );
        if !assessment.needs_confirmation() {
            return Ok(GuardOutcome::Checked { confirmed: false });
        }

        warn!("{}", assessment.prompt());
        if self.confirm.confirm(&assessment.prompt()) {
            Ok(GuardOutcome::Checked { confirmed: true })
        } else {
            Err(SearchError::Aborted)
        }
    }
}
