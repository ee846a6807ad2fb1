//! Formflow - multi-step form orchestration
//!
//! Sequences form steps, gates forward navigation on step-scoped
//! validation, accumulates values across steps and submits the result
//! through an external collaborator with bounded retry and backoff.

pub mod config;
pub mod error;
pub mod retry;
pub mod state;
pub mod submit;

pub use error::{FormError, WiringError};
pub use retry::{Classify, RetryError, RetryExecutor, RetryPolicy, RetryState};
pub use state::{
    FieldDescriptor, FieldErrors, FieldRule, FieldValue, FileHandle, FormSession, FormValues,
    NavigationState, PendingSubmission, PendingValidation, Phase, StepDefinition, StepOutcome,
    StepSchema, StepSequence, SubmissionReport, ValidationReport, ValidationResult,
};
pub use submit::{SubmissionCoordinator, SubmissionOutcome, SubmitError, Submitter};
