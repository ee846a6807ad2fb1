//! Error types for form sessions

use crate::state::Phase;
use thiserror::Error;

/// Programmer or configuration mistakes.
///
/// These indicate a wiring bug, not user input, and are never stored as
/// field errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("step index {index} is outside the sequence of {step_count} steps")]
    StepOutOfRange { index: usize, step_count: usize },

    #[error("field `{0}` is not owned by any step")]
    UnknownField(String),

    #[error("schema for step `{step}` reported an error for unowned field `{field}`")]
    UnownedFieldError { step: String, field: String },

    #[error("a form needs at least one step")]
    EmptySequence,

    #[error("step id `{0}` is used more than once")]
    DuplicateStepId(String),

    #[error("field `{field}` is owned by both `{first}` and `{second}`")]
    FieldOwnedTwice {
        field: String,
        first: String,
        second: String,
    },

    #[error("rule on step `{step}` targets field `{field}` which the step does not own")]
    RuleReferencesUnownedField { step: String, field: String },
}

/// Reasons a navigation or submission request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("another transition is in progress ({phase:?})")]
    Busy { phase: Phase },

    #[error("already on the last step; submit instead")]
    AtLastStep,

    #[error("submit is only available on the last step")]
    NotOnLastStep,

    #[error("step {target} has not been reached yet")]
    StepNotReachable { target: usize },

    #[error("the form session has been closed")]
    SessionClosed,

    #[error("nothing to resume: the last submission did not fail ({phase:?})")]
    NotFailed { phase: Phase },

    #[error("ticket {0} does not belong to the transition in progress")]
    StaleTicket(u64),

    #[error(transparent)]
    Wiring(#[from] WiringError),
}

impl FormError {
    /// True for errors caused by incorrect wiring rather than user input
    pub fn is_fatal(&self) -> bool {
        matches!(self, FormError::Wiring(_))
    }
}
