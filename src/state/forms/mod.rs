//! Form domain layer
//!
//! Field values, the per-session store, step schemas and the step sequence.

mod field;
mod form_state;
mod schema;
mod step;

pub use field::{FieldDescriptor, FieldValue, FileHandle};
pub use form_state::{FieldErrors, FormStore, FormValues};
pub use schema::{merge_errors, FieldRule, RuleSchema, StepSchema, ValidationResult};
pub use step::{StepDefinition, StepSequence};

#[cfg(test)]
pub use schema::MockStepSchema;
