use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;

use crate::{
    error::Error,
    github::{WorkflowApi, WorkflowRun},
};

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How long to wait between polls, how old a run may be, and whether to give up.
///
/// `max_polls: None` is the unbounded policy: the token-producing workflow may not
/// have been triggered yet, so "nothing to see" is waited out indefinitely. An
/// operator bounds a stuck poll by killing the step, or by setting a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollPolicy {
    pub(crate) interval: Duration,
    pub(crate) freshness_window: Duration,
    pub(crate) max_polls: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            max_polls: None,
        }
    }
}

/// Wall clock and blocking wait, injectable so polling can be driven without real delays.
#[async_trait]
pub(crate) trait PollClock {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub(crate) struct TokioClock;

#[async_trait]
impl PollClock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// What a single poll saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Observation {
    NoRun,
    Incomplete(WorkflowRun),
    Stale(WorkflowRun),
    Ready(WorkflowRun),
}

impl PollPolicy {
    pub(crate) fn observe(&self, run: Option<WorkflowRun>, now: DateTime<Utc>) -> Observation {
        let Some(run) = run else {
            return Observation::NoRun;
        };
        if !run.is_completed() {
            return Observation::Incomplete(run);
        }

        // A run that started in the future (clock skew) counts as fresh.
        let age = (now - run.run_started_at).to_std().unwrap_or_default();
        if age >= self.freshness_window {
            Observation::Stale(run)
        } else {
            Observation::Ready(run)
        }
    }
}

/// Wait for the most recent run of the workflow to be completed and to have
/// started within the freshness window.
///
/// Every observation that is not ready is followed by one full `interval` of
/// sleep, so a run flipping to completed between polls never causes a busy loop.
/// The exception is the last poll a cap allows, which fails without sleeping.
/// Non-2xx responses from `api` abort immediately.
#[tracing::instrument(skip_all, fields(
    interval_secs = policy.interval.as_secs(),
    freshness_secs = policy.freshness_window.as_secs(),
    max_polls = ?policy.max_polls,
))]
pub(crate) async fn await_completed_run(
    api: &(dyn WorkflowApi + Send + Sync),
    clock: &(dyn PollClock + Send + Sync),
    policy: &PollPolicy,
    workflow: &str,
) -> Result<WorkflowRun> {
    let mut polls: u64 = 0;
    loop {
        polls += 1;

        let latest = api.latest_run().await?;
        match policy.observe(latest, clock.now()) {
            Observation::Ready(run) => {
                tracing::info!(run_id = run.id, polls, "Found a fresh completed workflow run");
                return Ok(run);
            }
            Observation::NoRun => {
                tracing::debug!(polls, "No workflow run yet");
            }
            Observation::Incomplete(run) => {
                tracing::debug!(run_id = run.id, status = ?run.status, polls, "Latest workflow run is not completed");
            }
            Observation::Stale(run) => {
                tracing::debug!(
                    run_id = run.id,
                    started = %run.run_started_at,
                    polls,
                    "Couldn't find a recent token, waiting for a newer run"
                );
            }
        }

        // The last allowed poll fails without sleeping.
        if policy.max_polls.is_some_and(|max| polls >= max) {
            return Err(Error::PollsExhausted {
                workflow: workflow.to_string(),
                polls,
            })?;
        }

        tracing::debug!(interval_secs = policy.interval.as_secs(), "Waiting before the next poll");
        clock.sleep(policy.interval).await;
    }
}
