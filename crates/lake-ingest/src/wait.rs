//! Poll a managed resource until it is usable
//!
//! Crawlers, streams and delivery buffers all accept a request and become
//! usable some unknown time later. [`wait_until`] polls a status accessor at
//! a fixed interval and stops on the first of:
//!
//! - the ready predicate holding (success)
//! - the terminal predicate holding ([`LakeError::TerminalState`])
//! - the next poll falling past `max_wait` ([`LakeError::Timeout`])
//! - the cancellation token firing ([`LakeError::Cancelled`])
//! - the accessor itself failing (its error, unchanged)

use lake_common::types::ResourceStatus;
use lake_common::{LakeError, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often to poll and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl WaitPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    pub fn from_secs(interval_secs: u64, max_wait_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(max_wait_secs),
        )
    }
}

/// A successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activated<S> {
    /// The status that satisfied the ready predicate
    pub status: S,
    /// Number of status calls made, including the final one
    pub polls: u32,
    pub waited: Duration,
}

/// Poll `status` every `policy.interval` until `is_ready` or `is_terminal`
/// holds for the returned value.
///
/// The first poll happens immediately. A status that is both ready and
/// terminal counts as ready.
pub async fn wait_until<S, F, Fut, R, T>(
    resource: &str,
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut status: F,
    is_ready: R,
    is_terminal: T,
) -> Result<Activated<S>>
where
    S: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
    R: Fn(&S) -> bool,
    T: Fn(&S) -> bool,
{
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(LakeError::Cancelled(format!("waiting for {resource}")));
        }

        let current = status().await?;
        polls += 1;

        if is_ready(&current) {
            debug!(resource, status = %current, polls, "resource is ready");
            return Ok(Activated {
                status: current,
                polls,
                waited: started.elapsed(),
            });
        }

        if is_terminal(&current) {
            return Err(LakeError::TerminalState {
                resource: resource.to_string(),
                status: current.to_string(),
            });
        }

        let waited = started.elapsed();
        let next_poll = waited.checked_add(policy.interval);
        if next_poll.map_or(true, |next| next > policy.max_wait) {
            return Err(LakeError::Timeout {
                resource: resource.to_string(),
                waited,
            });
        }

        debug!(resource, status = %current, polls, "resource not ready yet");

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(LakeError::Cancelled(format!("waiting for {resource}")));
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

/// [`wait_until`] for services that report a [`ResourceStatus`]:
/// `Active` is ready, `Deleting` and `Error` are terminal.
pub async fn wait_until_active<F, Fut>(
    resource: &str,
    policy: WaitPolicy,
    cancel: &CancellationToken,
    status: F,
) -> Result<Activated<ResourceStatus>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ResourceStatus>>,
{
    wait_until(
        resource,
        policy,
        cancel,
        status,
        |s: &ResourceStatus| s.is_active(),
        |s: &ResourceStatus| s.is_terminal_failure(),
    )
    .await
}
