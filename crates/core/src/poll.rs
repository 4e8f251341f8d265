use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, StorekeepError};

/// Fixed-interval, fixed-budget polling. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Done(T),
    Failed(String),
}

/// Calls `fetch` until it reports a terminal status, at most `policy.max_attempts` times,
/// sleeping `policy.interval` between consecutive calls.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    name: &str,
    cancel: Option<&CancellationToken>,
    mut fetch: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(StorekeepError::Cancelled(name.to_string()));
        }
        match fetch(attempt).await? {
            PollStatus::Done(value) => return Ok(value),
            PollStatus::Failed(message) => {
                return Err(StorekeepError::OperationFailed {
                    name: name.to_string(),
                    message,
                })
            }
            PollStatus::Pending => {}
        }
        debug!(operation = %name, attempt, max_attempts, "operation still pending");
        if attempt < max_attempts {
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(StorekeepError::Cancelled(name.to_string()));
                        }
                        _ = tokio::time::sleep(policy.interval) => {}
                    }
                }
                None => tokio::time::sleep(policy.interval).await,
            }
        }
    }
    Err(StorekeepError::Timeout {
        name: name.to_string(),
        attempts: max_attempts,
    })
}
