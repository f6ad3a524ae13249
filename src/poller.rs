//! Poll-based async job protocol
//!
//! The remote table service never answers a query or a bulk download
//! synchronously: a call starts a job and hands back a token, and the token is
//! then checked until the job reports a result. [`start_and_await`] drives that
//! loop under a bounded [`PollConfig`] budget.

use crate::config::PollConfig;
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Instant;

/// Outcome of a single status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    /// The job finished and produced a value
    Ready(T),
    /// The job is still running
    NotReady,
}

/// Start a remote job and poll it until it is ready
///
/// `start` is called once and returns the job token. Each attempt then sleeps
/// `policy.interval` (skipped when zero) before calling `check` with the token.
///
/// - `Ready(v)` ends the loop with `v`
/// - `NotReady` uses up one attempt and loops
/// - an error from `check` propagates immediately without further attempts
///
/// When `policy.max_attempts` checks all report `NotReady` the result is
/// [`Error::PollTimeout`], which callers can tell apart from a remote failure.
pub async fn start_and_await<T, S, SFut, C, CFut>(
    policy: &PollConfig,
    job: &str,
    start: S,
    mut check: C,
) -> Result<T>
where
    S: FnOnce() -> SFut,
    SFut: Future<Output = Result<String>>,
    C: FnMut(String) -> CFut,
    CFut: Future<Output = Result<JobStatus<T>>>,
{
    let started = Instant::now();
    let token = start().await?;
    tracing::debug!(job, "Async job started");

    for attempt in 1..=policy.max_attempts {
        if !policy.interval.is_zero() {
            tokio::time::sleep(policy.interval).await;
        }

        match check(token.clone()).await? {
            JobStatus::Ready(value) => {
                tracing::debug!(
                    job,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Async job ready"
                );
                return Ok(value);
            }
            JobStatus::NotReady => {
                tracing::debug!(job, attempt, max_attempts = policy.max_attempts, "Async job not ready");
            }
        }
    }

    tracing::warn!(
        job,
        attempts = policy.max_attempts,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Async job did not finish within its poll budget"
    );
    Err(Error::PollTimeout {
        job: job.to_string(),
        attempts: policy.max_attempts,
    })
}
