//! Trait abstraction for the submit collaborator to enable mocking in tests

use crate::retry::Classify;
use crate::state::FormValues;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a submit collaborator.
///
/// The collaborator decides which class a failure belongs to; the form never
/// infers it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Network or server-side hiccup (5xx-equivalent); worth retrying
    #[error("temporary failure: {0}")]
    Transient(String),

    /// The collaborator gave up waiting; worth retrying
    #[error("submission timed out")]
    Timeout,

    /// The data was refused (4xx-equivalent, conflict, business rule)
    #[error("submission rejected: {0}")]
    Rejected(String),
}

impl Classify for SubmitError {
    fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transient(_) | SubmitError::Timeout)
    }
}

/// Receives the final form values.
///
/// The success payload is opaque to the form and handed back unchanged.
/// Implementations own their timeouts and report them as
/// [`SubmitError::Timeout`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, values: &FormValues) -> Result<Value, SubmitError>;
}
