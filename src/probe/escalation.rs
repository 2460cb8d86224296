//! Progressive timeout escalation for the metadata fetch.
//!
//! ```text
//! NotStarted -> FastAttempt -+- responded -> Succeeded
//!                            +- timed out -> SlowProbe -+- alive -> FullAttempt -> Succeeded | Failed
//!                            |                          +- else  -> Failed
//!                            +- error     -> Failed
//! ```
//!
//! The fast attempt only waits a fraction of the budget for the response head, so
//! dead hosts cost little. A timeout there is followed by a HEAD liveness check at
//! the full budget, and only a live host gets the full-budget GET.

use std::time::Duration;
use tokio::time::Instant;

use crate::error::FetchError;
use crate::http::{FetchTimeouts, FetchedResponse, HttpFetcher};

/// Share of the budget the fast attempt may wait for the response head.
pub const FAST_CONNECT_FRACTION: f64 = 0.4;
/// Upper bound of the fast attempt's head wait.
pub const FAST_CONNECT_CAP: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    NotStarted,
    FastAttempt,
    SlowProbe,
    FullAttempt,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Start,
    Responded,
    TimedOut,
    Errored,
}

impl From<&FetchError> for StepEvent {
    fn from(e: &FetchError) -> Self {
        if e.is_timeout() {
            StepEvent::TimedOut
        } else {
            StepEvent::Errored
        }
    }
}

impl FetchStage {
    pub fn next(self, event: StepEvent) -> FetchStage {
        use FetchStage::*;
        use StepEvent::*;
        match (self, event) {
            (NotStarted, Start) => FastAttempt,
            (FastAttempt, Responded) => Succeeded,
            (FastAttempt, TimedOut) => SlowProbe,
            (FastAttempt, Errored) => Failed,
            (SlowProbe, Responded) => FullAttempt,
            (SlowProbe, TimedOut | Errored) => Failed,
            (FullAttempt, Responded) => Succeeded,
            (FullAttempt, TimedOut | Errored) => Failed,
            (stage, _) => stage,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FetchStage::Succeeded | FetchStage::Failed)
    }
}

/// Time limits for each stage, derived from one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    pub fast: FetchTimeouts,
    pub probe_timeout: Duration,
    pub full: FetchTimeouts,
}

impl FetchPlan {
    pub fn for_budget(budget: Duration) -> Self {
        let connect = budget.mul_f64(FAST_CONNECT_FRACTION).min(FAST_CONNECT_CAP);
        Self {
            fast: FetchTimeouts {
                connect,
                total: budget,
            },
            probe_timeout: budget,
            full: FetchTimeouts::uniform(budget),
        }
    }
}

/// What the escalation produced.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub response: Option<FetchedResponse>,
    pub elapsed: Duration,
    /// Stages visited, in order, ending with a terminal stage.
    pub trail: Vec<FetchStage>,
    pub error: Option<FetchError>,
}

/// Drive the stages to a terminal state. Never fails; errors land in the report.
pub async fn run_fetch(fetcher: &dyn HttpFetcher, url: &str, plan: FetchPlan) -> FetchReport {
    let start = Instant::now();
    let mut stage = FetchStage::NotStarted.next(StepEvent::Start);
    let mut trail = vec![stage];
    let mut response = None;
    let mut error = None;

    while !stage.is_terminal() {
        let event = match stage {
            FetchStage::FastAttempt | FetchStage::FullAttempt => {
                let timeouts = if stage == FetchStage::FastAttempt {
                    plan.fast
                } else {
                    plan.full
                };
                match fetcher.get(url, timeouts).await {
                    Ok(resp) => {
                        response = Some(resp);
                        error = None;
                        StepEvent::Responded
                    }
                    Err(e) => {
                        let event = StepEvent::from(&e);
                        tracing::debug!(url, ?stage, "fetch attempt failed: {e}");
                        error = Some(e);
                        event
                    }
                }
            }
            FetchStage::SlowProbe => match fetcher.head(url, plan.probe_timeout).await {
                Ok(status) => {
                    tracing::debug!(url, status, "liveness check passed, retrying at full budget");
                    StepEvent::Responded
                }
                Err(e) => {
                    let event = StepEvent::from(&e);
                    error = Some(e);
                    event
                }
            },
            FetchStage::NotStarted | FetchStage::Succeeded | FetchStage::Failed => break,
        };
        stage = stage.next(event);
        trail.push(stage);
    }

    FetchReport {
        response,
        elapsed: start.elapsed(),
        trail,
        error,
    }
}
