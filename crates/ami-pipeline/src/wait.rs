//! Convergence polling at a fixed interval.
//!
//! Waits for an asynchronous resource (an image build, a node group
//! rollout) to reach a terminal state. The interval is constant and there
//! is no retry on error: "not done yet" is tolerated, a failing check is
//! returned to the caller immediately.
//!
//! Time comes from `tokio::time`, so tests run with a paused clock and
//! simulate hours of polling instantly.

use ami_pipeline_common::defaults::{IMAGE_TIMEOUT_SECS, POLL_INTERVAL_SECS};
use ami_pipeline_common::{Convergence, PollOutcome};
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for convergence polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between checks
    pub interval: Duration,
    /// Maximum total time to wait before reporting a timeout
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(IMAGE_TIMEOUT_SECS),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll `check` until `classify` reports a terminal state or the timeout
/// elapses.
///
/// # Arguments
/// * `config` - Interval and timeout
/// * `resource_name` - Name for logging
/// * `check` - Async function observing the current state
/// * `classify` - Maps an observation onto [`Convergence`]
///
/// # Returns
/// * `Ok(outcome)` - `Available`, `Failed`, `NotFound` or `Timeout`
/// * `Err` - A check failed; polling stops at the first failure
///
/// # Example
/// ```ignore
/// let outcome = poll_until_terminal(
///     &PollConfig::default(),
///     &image_id,
///     || ec2.describe_image_state(&image_id),
///     |state| state.map_or(Convergence::Missing, ImageState::convergence),
/// )
/// .await?;
/// ```
pub async fn poll_until_terminal<S, F, Fut, C>(
    config: &PollConfig,
    resource_name: &str,
    mut check: F,
    classify: C,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
    C: Fn(&S) -> Convergence,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    info!(
        resource = %resource_name,
        interval = ?config.interval,
        timeout = ?config.timeout,
        "Waiting for resource to converge"
    );

    loop {
        if start.elapsed() > config.timeout {
            warn!(
                resource = %resource_name,
                timeout = ?config.timeout,
                attempts,
                "Timeout waiting for resource"
            );
            return Ok(PollOutcome::Timeout);
        }

        attempts += 1;
        let state = match check().await {
            Ok(state) => state,
            Err(e) => {
                warn!(resource = %resource_name, error = ?e, "Resource check failed");
                return Err(e);
            }
        };

        if let Some(outcome) = PollOutcome::from_convergence(classify(&state)) {
            info!(resource = %resource_name, %outcome, attempts, "Resource reached terminal state");
            return Ok(outcome);
        }

        debug!(
            resource = %resource_name,
            attempt = attempts,
            elapsed = ?start.elapsed(),
            "Resource not ready, retrying"
        );
        tokio::time::sleep(config.interval).await;
    }
}
