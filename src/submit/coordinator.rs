//! Submission coordinator: full-form validation, then submit under retry

use super::traits::{SubmitError, Submitter};
use crate::error::WiringError;
use crate::retry::{RetryError, RetryExecutor, RetryPolicy, RetryState};
use crate::state::{merge_errors, FieldErrors, FormValues, StepSequence, ValidationResult};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a submission attempt chain ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// The collaborator accepted the values
    Succeeded(Value),
    /// Full-form validation failed; the collaborator was not called
    Invalid(FieldErrors),
    /// Terminal rejection or retries exhausted
    Failed { error: SubmitError, attempts: u32 },
    /// The session was abandoned before the chain settled
    Cancelled,
}

/// Maps "all steps valid" to "submit invoked", and the collaborator's
/// answer to a terminal outcome.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    submitter: Arc<dyn Submitter>,
    policy: RetryPolicy,
}

impl fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SubmissionCoordinator {
    pub fn new(submitter: Arc<dyn Submitter>, policy: RetryPolicy) -> Self {
        Self { submitter, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run every step's schema against the complete values.
    ///
    /// Earlier steps are re-checked because later answers can invalidate
    /// them. A schema reporting a field it does not own is a wiring error.
    pub async fn validate_all(
        &self,
        steps: &StepSequence,
        values: &FormValues,
    ) -> Result<ValidationResult, WiringError> {
        let mut valid = true;
        let mut collected = Vec::with_capacity(steps.len());

        for step in steps.iter() {
            let result = step.schema().validate(values, step.fields()).await;
            result.check_ownership(step.id(), step.fields())?;
            if !result.valid {
                debug!(
                    step = step.id(),
                    errors = result.errors.len(),
                    "Step failed full validation"
                );
                valid = false;
            }
            collected.push(result.errors);
        }

        Ok(ValidationResult {
            valid,
            errors: merge_errors(collected),
        })
    }

    /// Call the collaborator under the retry policy.
    ///
    /// Rejections short-circuit; transient failures and timeouts are retried.
    pub async fn submit(
        &self,
        values: &FormValues,
        cancel: &CancellationToken,
        progress: Option<watch::Sender<RetryState>>,
    ) -> SubmissionOutcome {
        let mut executor = RetryExecutor::new(self.policy);
        if let Some(tx) = progress {
            executor = executor.with_progress(tx);
        }

        let submitter = &self.submitter;
        let result = executor
            .execute(
                || {
                    let submitter = Arc::clone(submitter);
                    let values = values.clone();
                    async move { submitter.submit(&values).await }
                },
                cancel,
            )
            .await;

        match result {
            Ok(receipt) => {
                info!("Submission accepted");
                SubmissionOutcome::Succeeded(receipt)
            }
            Err(RetryError::Cancelled { attempts, .. }) => {
                info!(attempts, "Submission cancelled");
                SubmissionOutcome::Cancelled
            }
            Err(RetryError::Terminal { attempts, error })
            | Err(RetryError::Exhausted { attempts, error }) => {
                warn!(attempts, "Submission failed: {error}");
                SubmissionOutcome::Failed { error, attempts }
            }
        }
    }

    /// Validate everything, then submit if (and only if) all steps pass
    pub async fn run(
        &self,
        steps: &StepSequence,
        values: &FormValues,
        cancel: &CancellationToken,
        progress: Option<watch::Sender<RetryState>>,
    ) -> Result<SubmissionOutcome, WiringError> {
        if cancel.is_cancelled() {
            return Ok(SubmissionOutcome::Cancelled);
        }

        let validation = self.validate_all(steps, values).await?;
        if !validation.valid {
            info!(errors = validation.errors.len(), "Submission blocked by validation");
            return Ok(SubmissionOutcome::Invalid(validation.errors));
        }

        if cancel.is_cancelled() {
            return Ok(SubmissionOutcome::Cancelled);
        }
        Ok(self.submit(values, cancel, progress).await)
    }
}
