//! Submission of a completed form through an external collaborator

mod coordinator;
mod traits;

pub use coordinator::{SubmissionCoordinator, SubmissionOutcome};
pub use traits::{SubmitError, Submitter};

#[cfg(test)]
pub use traits::MockSubmitter;
