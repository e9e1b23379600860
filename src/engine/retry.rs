//! Bounded retry for venue calls.
//!
//! Every venue interaction in the purchase loop goes through
//! [`with_retries`]: a fixed number of attempts with a fixed backoff.
//! Order creation is the one exception, since replaying a POST that may
//! have landed would double-spend.

use anyhow::Result;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-backoff retry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_secs: 5,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Run `op` until it succeeds or the policy is exhausted, sleeping the
/// backoff between attempts (never after the last one). `skip_waits`
/// drops the sleeps so tests run instantly.
///
/// On exhaustion the last error is returned, wrapped with the operation
/// name and attempt count.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    skip_waits: bool,
    op_name: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Venue call failed"
                );
                last_err = Some(e);
                if attempt < policy.max_attempts && !skip_waits {
                    tokio::time::sleep(policy.backoff()).await;
                }
            }
        }
    }

    match last_err {
        Some(e) => Err(e.context(format!(
            "{op_name} failed after {} attempts",
            policy.max_attempts
        ))),
        None => anyhow::bail!("{op_name} failed: retry policy allows no attempts"),
    }
}
