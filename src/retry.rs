//! Retry with exponential backoff.
//!
//! Domain-agnostic wrapper around a fallible async operation:
//!
//! - attempt 0 runs immediately
//! - after the n-th failure the executor waits
//!   `min(initial_delay * multiplier^(n-1), max_delay)` before trying again
//! - at most `max_retries + 1` invocations in total
//! - errors that classify as non-retryable are returned at once
//! - a [`CancellationToken`] stops the operation or a pending wait without
//!   firing another attempt

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the first attempt).
    pub max_retries: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Growth factor between successive waits.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based).
    ///
    /// Multipliers below 1 are treated as 1 so delays never shrink.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = self.backoff_multiplier.max(1.0);
        let base = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        if !base.is_finite() || base >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(base.max(0.0))
        }
    }
}

/// Progress of one retry chain, published for "retrying" indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    /// Number of failed attempts so far.
    pub attempt: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Wait before the next attempt.
    pub next_delay: Duration,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            last_error: None,
            next_delay: policy.initial_delay,
        }
    }

    /// True while a failed attempt is waiting to be retried
    pub fn is_retrying(&self) -> bool {
        self.attempt > 0
    }
}

/// Lets the executor tell transient failures from terminal ones.
pub trait Classify {
    fn is_retryable(&self) -> bool;
}

/// Why an operation run through the executor did not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },

    #[error("failed without retry on attempt {attempts}: {error}")]
    Terminal { attempts: u32, error: E },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Terminal { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation, if any
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { error, .. } | RetryError::Terminal { error, .. } => Some(error),
            RetryError::Cancelled { last, .. } => last.as_ref(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    progress: Option<watch::Sender<RetryState>>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            progress: None,
        }
    }

    /// Publish [`RetryState`] updates on `progress`.
    pub fn with_progress(mut self, progress: watch::Sender<RetryState>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn publish(&self, state: &RetryState) {
        if let Some(tx) = &self.progress {
            tx.send_replace(state.clone());
        }
    }

    /// Invoke `operation` until it succeeds, fails terminally, runs out of
    /// retries or `cancel` fires.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut state = RetryState::new(&self.policy);
        self.publish(&state);
        let mut last: Option<E> = None;

        loop {
            let attempts = state.attempt;
            if cancel.is_cancelled() {
                info!(attempts, "Retry chain cancelled before attempt");
                return Err(RetryError::Cancelled { attempts, last });
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempts = attempts + 1, "Retry chain cancelled during attempt");
                    return Err(RetryError::Cancelled { attempts: attempts + 1, last });
                }
                outcome = operation() => outcome,
            };

            let attempts = attempts + 1;
            if cancel.is_cancelled() {
                info!(attempts, "Retry chain cancelled; discarding attempt result");
                return Err(RetryError::Cancelled {
                    attempts,
                    last: outcome.err().or(last),
                });
            }

            let error = match outcome {
                Ok(value) => {
                    debug!(attempts, "Operation succeeded");
                    self.publish(&RetryState::new(&self.policy));
                    return Ok(value);
                }
                Err(error) => error,
            };

            state.attempt = attempts;
            state.last_error = Some(error.to_string());

            if !error.is_retryable() {
                warn!(attempts, "Operation failed with non-retryable error: {error}");
                self.publish(&state);
                return Err(RetryError::Terminal { attempts, error });
            }

            if attempts > self.policy.max_retries {
                warn!(attempts, "Retries exhausted: {error}");
                self.publish(&state);
                return Err(RetryError::Exhausted { attempts, error });
            }

            let delay = self.policy.delay_for(attempts);
            state.next_delay = delay;
            self.publish(&state);
            warn!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Operation failed, retrying: {error}"
            );
            last = Some(error);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempts, "Retry chain cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts, last });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Run `operation` once under `policy` without progress reporting.
pub async fn execute<T, E, F, Fut>(
    operation: F,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    RetryExecutor::new(policy).execute(operation, cancel).await
}
