//! Navigation controller: step pointer, visited set and transition phases
//!
//! Transitions that suspend are split into a `begin_*` call that moves the
//! session out of `Idle` and hands back an owned ticket, the ticket's `run`
//! future, and a `complete_*` call that applies the result. Field edits may
//! happen between `begin_*` and `complete_*`; any other transition request is
//! refused until the ticket is completed.

use super::forms::{
    FieldDescriptor, FieldErrors, FieldValue, FormStore, FormValues, StepDefinition,
    StepSchema, StepSequence, ValidationResult,
};
use crate::error::{FormError, WiringError};
use crate::retry::{RetryPolicy, RetryState};
use crate::submit::{SubmissionCoordinator, SubmissionOutcome, SubmitError, Submitter};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What the session is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ValidatingStep,
    Submitting,
    Succeeded,
    Failed,
}

/// Where the user is in the form.
///
/// `current_index` is always a member of `visited`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    current_index: usize,
    visited: BTreeSet<usize>,
    phase: Phase,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current_index: 0,
            visited: BTreeSet::from([0]),
            phase: Phase::Idle,
        }
    }
}

impl NavigationState {
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn visited(&self) -> &BTreeSet<usize> {
        &self.visited
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether `target` may be jumped to directly
    pub fn can_go_to(&self, target: usize) -> bool {
        self.visited.contains(&target) || target <= self.current_index
    }

    fn move_to(&mut self, index: usize) {
        self.current_index = index;
        self.visited.insert(index);
    }
}

/// Result of a forward navigation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step passed; the pointer moved to `to`
    Advanced { to: usize },
    /// Step failed; errors were written to the store
    Invalid(FieldErrors),
    /// The step's fields changed while validating; result discarded
    Stale,
    /// The ticket was withdrawn with `cancel_pending`; nothing was applied
    Cancelled,
}

/// Owned snapshot needed to validate one step away from the session
pub struct PendingValidation {
    ticket: u64,
    step: usize,
    step_id: String,
    generation: u64,
    schema: Arc<dyn StepSchema>,
    owned: BTreeSet<String>,
    values: FormValues,
    cancel: CancellationToken,
}

/// Settled step validation, ready for [`FormSession::complete_next`]
#[derive(Debug, Clone)]
pub struct ValidationReport {
    ticket: u64,
    step: usize,
    generation: u64,
    result: Option<ValidationResult>,
}

impl fmt::Debug for PendingValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValidation")
            .field("ticket", &self.ticket)
            .field("step", &self.step_id)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl PendingValidation {
    pub fn step(&self) -> usize {
        self.step
    }

    /// Run the step's schema against the values captured at `begin_next`
    pub async fn run(self) -> ValidationReport {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(step = %self.step_id, "Step validation cancelled");
                None
            }
            result = self.schema.validate(&self.values, &self.owned) => Some(result),
        };
        ValidationReport {
            ticket: self.ticket,
            step: self.step,
            generation: self.generation,
            result,
        }
    }
}

/// Owned snapshot needed to validate and submit the whole form
pub struct PendingSubmission {
    ticket: u64,
    generation: u64,
    steps: Arc<StepSequence>,
    values: FormValues,
    coordinator: SubmissionCoordinator,
    cancel: CancellationToken,
    progress: watch::Sender<RetryState>,
}

/// Settled submission, ready for [`FormSession::complete_submit`]
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    ticket: u64,
    generation: u64,
    outcome: Result<SubmissionOutcome, WiringError>,
}

impl fmt::Debug for PendingSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSubmission")
            .field("ticket", &self.ticket)
            .field("fields", &self.values.len())
            .finish_non_exhaustive()
    }
}

impl PendingSubmission {
    /// Retry progress for a "retrying" indicator
    pub fn progress(&self) -> watch::Receiver<RetryState> {
        self.progress.subscribe()
    }

    /// Validate every step, then submit under the retry policy
    pub async fn run(self) -> SubmissionReport {
        let outcome = self
            .coordinator
            .run(&self.steps, &self.values, &self.cancel, Some(self.progress))
            .await;
        SubmissionReport {
            ticket: self.ticket,
            generation: self.generation,
            outcome,
        }
    }
}

/// Transition currently holding the session out of `Idle`
#[derive(Debug)]
struct InFlight {
    ticket: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Current,
    Withdrawn,
}

/// Withdraws whatever is still in flight when a convenience transition
/// future is dropped; a no-op once the ticket has been completed.
struct TransitionGuard<'a>(&'a mut FormSession);

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.cancel_pending();
    }
}

/// One user's pass through a multi-step form.
///
/// Owns the values, errors and navigation state; rendering code reads
/// snapshots and mutates only through the methods below.
#[derive(Debug)]
pub struct FormSession {
    id: Uuid,
    steps: Arc<StepSequence>,
    store: FormStore,
    nav: NavigationState,
    coordinator: SubmissionCoordinator,
    cancel: CancellationToken,
    in_flight: Option<InFlight>,
    withdrawn: Option<u64>,
    next_ticket: u64,
    last_error: Option<SubmitError>,
    receipt: Option<Value>,
    closed: bool,
}

impl FormSession {
    pub fn new(steps: StepSequence, submitter: Arc<dyn Submitter>, policy: RetryPolicy) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, steps = steps.len(), "Form session started");
        Self {
            id,
            steps: Arc::new(steps),
            store: FormStore::new(),
            nav: NavigationState::default(),
            coordinator: SubmissionCoordinator::new(submitter, policy),
            cancel: CancellationToken::new(),
            in_flight: None,
            withdrawn: None,
            next_ticket: 1,
            last_error: None,
            receipt: None,
            closed: false,
        }
    }

    /// Start a session with caller-supplied initial values
    pub fn with_defaults(
        steps: StepSequence,
        submitter: Arc<dyn Submitter>,
        policy: RetryPolicy,
        defaults: FormValues,
    ) -> Result<Self, WiringError> {
        let unknown = defaults.iter().find(|(name, _)| steps.owner_of(name).is_none());
        if let Some((name, _)) = unknown {
            return Err(WiringError::UnknownField(name.to_string()));
        }
        let mut session = Self::new(steps, submitter, policy);
        session.store = FormStore::with_values(defaults);
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &NavigationState {
        &self.nav
    }

    pub fn phase(&self) -> Phase {
        self.nav.phase
    }

    pub fn current_index(&self) -> usize {
        self.nav.current_index
    }

    pub fn visited(&self) -> &BTreeSet<usize> {
        &self.nav.visited
    }

    pub fn steps(&self) -> &StepSequence {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn current_step(&self) -> &StepDefinition {
        &self.steps[self.nav.current_index]
    }

    pub fn is_first_step(&self) -> bool {
        self.nav.current_index == 0
    }

    pub fn is_last_step(&self) -> bool {
        self.nav.current_index == self.steps.last_index()
    }

    /// 1-based position and total, for progress indicators
    pub fn progress(&self) -> (usize, usize) {
        (self.nav.current_index + 1, self.steps.len())
    }

    pub fn can_go_to(&self, target: usize) -> bool {
        target < self.steps.len() && self.nav.can_go_to(target)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn values(&self) -> &FormValues {
        self.store.values()
    }

    pub fn errors(&self) -> &FieldErrors {
        self.store.errors()
    }

    /// Error kept from the last failed submission
    pub fn last_error(&self) -> Option<&SubmitError> {
        self.last_error.as_ref()
    }

    /// Payload returned by the collaborator after a successful submission
    pub fn receipt(&self) -> Option<&Value> {
        self.receipt.as_ref()
    }

    /// Descriptor for one field, None if no step owns it
    pub fn field(&self, name: &str) -> Option<FieldDescriptor<'_>> {
        let step = self.steps.owner_of(name)?;
        let name = self.steps.get(step)?.fields().get(name)?;
        Some(self.describe(name, step))
    }

    /// Descriptors for the fields of the current step
    pub fn current_fields(&self) -> Vec<FieldDescriptor<'_>> {
        let step = self.nav.current_index;
        self.current_step()
            .fields()
            .iter()
            .map(|name| self.describe(name, step))
            .collect()
    }

    fn describe<'a>(&'a self, name: &'a str, step: usize) -> FieldDescriptor<'a> {
        FieldDescriptor {
            name,
            step,
            value: self.store.values().get(name),
            error: self.store.error(name),
            touched: self.store.is_touched(name),
        }
    }

    fn ensure_open(&self) -> Result<(), FormError> {
        if self.closed || self.nav.phase == Phase::Succeeded {
            return Err(FormError::SessionClosed);
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), FormError> {
        if self.closed {
            return Err(FormError::SessionClosed);
        }
        if self.nav.phase != Phase::Idle {
            debug!(session = %self.id, phase = ?self.nav.phase, "Transition rejected while busy");
            return Err(FormError::Busy {
                phase: self.nav.phase,
            });
        }
        Ok(())
    }

    fn known_field(&self, name: &str) -> Result<usize, FormError> {
        self.steps.owner_of(name).ok_or_else(|| {
            error!(session = %self.id, field = name, "Unknown field");
            FormError::Wiring(WiringError::UnknownField(name.to_string()))
        })
    }

    fn issue_ticket(&mut self, phase: Phase) -> (u64, CancellationToken) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let cancel = self.cancel.child_token();
        self.in_flight = Some(InFlight {
            ticket,
            cancel: cancel.clone(),
        });
        self.nav.phase = phase;
        (ticket, cancel)
    }

    fn settle_ticket(&mut self, ticket: u64) -> Result<Settled, FormError> {
        if self.closed {
            debug!(session = %self.id, ticket, "Discarding result for closed session");
            return Err(FormError::SessionClosed);
        }
        if self.withdrawn == Some(ticket) {
            self.withdrawn = None;
            debug!(session = %self.id, ticket, "Discarding result for withdrawn ticket");
            return Ok(Settled::Withdrawn);
        }
        match &self.in_flight {
            Some(in_flight) if in_flight.ticket == ticket => {}
            _ => return Err(FormError::StaleTicket(ticket)),
        }
        self.in_flight = None;
        self.nav.phase = Phase::Idle;
        Ok(Settled::Current)
    }

    /// Overwrite a value; its stale error is dropped immediately.
    ///
    /// Allowed while a validation or submission is in flight.
    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), FormError> {
        self.ensure_open()?;
        let step = self.known_field(name)?;
        let generation = self.store.set_field(name, value.into());
        debug!(session = %self.id, field = name, step, generation, "Field updated");
        Ok(())
    }

    /// Load values from a saved draft
    pub fn restore(&mut self, values: FormValues) -> Result<(), FormError> {
        self.ensure_idle()?;
        for (name, _) in values.iter() {
            self.known_field(name)?;
        }
        debug!(session = %self.id, fields = values.len(), "Restoring draft values");
        self.store.restore(values);
        Ok(())
    }

    /// Merge externally produced errors (e.g. from a server round trip)
    pub fn apply_errors(&mut self, errors: &FieldErrors) -> Result<(), FormError> {
        self.ensure_open()?;
        for name in errors.fields() {
            self.known_field(name)?;
        }
        self.store.apply_errors(errors);
        Ok(())
    }

    pub fn clear_errors(&mut self, fields: &BTreeSet<String>) -> Result<(), FormError> {
        self.ensure_open()?;
        self.store.clear_errors(fields);
        Ok(())
    }

    /// Step back one page without validating. No-op on the first step.
    pub fn back(&mut self) -> Result<usize, FormError> {
        self.ensure_idle()?;
        if self.nav.current_index > 0 {
            let to = self.nav.current_index - 1;
            self.nav.move_to(to);
            debug!(session = %self.id, to, "Moved back");
        }
        Ok(self.nav.current_index)
    }

    /// Jump to a step already reached in an earlier forward pass
    pub fn go_to_step(&mut self, target: usize) -> Result<usize, FormError> {
        self.ensure_idle()?;
        if target >= self.steps.len() {
            let err = WiringError::StepOutOfRange {
                index: target,
                step_count: self.steps.len(),
            };
            error!(session = %self.id, "{err}");
            return Err(err.into());
        }
        if !self.nav.can_go_to(target) {
            debug!(session = %self.id, target, "Jump to unvisited step rejected");
            return Err(FormError::StepNotReachable { target });
        }
        self.nav.move_to(target);
        debug!(session = %self.id, to = target, "Jumped to step");
        Ok(target)
    }

    /// Start validating the current step for forward navigation
    pub fn begin_next(&mut self) -> Result<PendingValidation, FormError> {
        self.ensure_idle()?;
        if self.is_last_step() {
            return Err(FormError::AtLastStep);
        }

        let step = self.nav.current_index;
        let definition = self.steps.step(step)?;
        let step_id = definition.id().to_string();
        let schema = definition.schema();
        let owned = definition.fields().clone();
        let values = self.store.values().restrict(&owned);
        let generation = self.store.generation_of(&owned);

        let (ticket, cancel) = self.issue_ticket(Phase::ValidatingStep);
        debug!(session = %self.id, step = %step_id, ticket, "Validating step");

        Ok(PendingValidation {
            ticket,
            step,
            step_id,
            generation,
            schema,
            owned,
            values,
            cancel,
        })
    }

    /// Apply a settled step validation
    pub fn complete_next(&mut self, report: ValidationReport) -> Result<StepOutcome, FormError> {
        let settled = self.settle_ticket(report.ticket)?;

        let (Settled::Current, Some(result)) = (settled, report.result) else {
            return Ok(StepOutcome::Cancelled);
        };

        let step = self.steps.step(report.step)?;
        if let Err(err) = result.check_ownership(step.id(), step.fields()) {
            error!(session = %self.id, "{err}");
            return Err(err.into());
        }

        if self.store.generation_of(step.fields()) != report.generation {
            debug!(session = %self.id, step = step.id(), "Discarding stale validation result");
            return Ok(StepOutcome::Stale);
        }

        if !result.valid {
            debug!(
                session = %self.id,
                step = step.id(),
                errors = result.errors.len(),
                "Step invalid"
            );
            self.store.apply_errors(&result.errors);
            return Ok(StepOutcome::Invalid(result.errors));
        }

        self.store.clear_errors(step.fields());
        let to = report.step + 1;
        self.nav.move_to(to);
        info!(session = %self.id, to, "Advanced to step");
        Ok(StepOutcome::Advanced { to })
    }

    /// Validate the current step and advance if it passes.
    ///
    /// Dropping the future before it resolves withdraws the validation.
    pub async fn next(&mut self) -> Result<StepOutcome, FormError> {
        let pending = self.begin_next()?;
        let guard = TransitionGuard(self);
        let report = pending.run().await;
        guard.0.complete_next(report)
    }

    /// Start the final submission from the last step
    pub fn begin_submit(&mut self) -> Result<PendingSubmission, FormError> {
        self.ensure_idle()?;
        if !self.is_last_step() {
            return Err(FormError::NotOnLastStep);
        }

        self.last_error = None;
        let (ticket, cancel) = self.issue_ticket(Phase::Submitting);
        let (progress, _) = watch::channel(RetryState::new(self.coordinator.policy()));
        info!(session = %self.id, ticket, "Submitting form");

        Ok(PendingSubmission {
            ticket,
            generation: self.store.generation(),
            steps: Arc::clone(&self.steps),
            values: self.store.values().clone(),
            coordinator: self.coordinator.clone(),
            cancel,
            progress,
        })
    }

    /// Apply a settled submission and move to the matching terminal phase
    pub fn complete_submit(
        &mut self,
        report: SubmissionReport,
    ) -> Result<SubmissionOutcome, FormError> {
        if self.settle_ticket(report.ticket)? == Settled::Withdrawn {
            if let Ok(SubmissionOutcome::Succeeded(_)) = &report.outcome {
                warn!(session = %self.id, "Withdrawn submission was accepted anyway");
            }
            return Ok(SubmissionOutcome::Cancelled);
        }

        let outcome = match report.outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(session = %self.id, "{err}");
                return Err(err.into());
            }
        };

        match &outcome {
            SubmissionOutcome::Succeeded(receipt) => {
                self.receipt = Some(receipt.clone());
                self.nav.phase = Phase::Succeeded;
                info!(session = %self.id, "Form submitted");
            }
            SubmissionOutcome::Invalid(errors) => {
                let current: FieldErrors = errors
                    .iter()
                    .filter(|(name, _)| !self.store.changed_since(name, report.generation))
                    .collect();
                if current.len() < errors.len() {
                    debug!(
                        session = %self.id,
                        dropped = errors.len() - current.len(),
                        "Dropping errors for fields edited during submission"
                    );
                }
                self.store.apply_errors(&current);
                info!(session = %self.id, errors = current.len(), "Form invalid at submit");
                return Ok(SubmissionOutcome::Invalid(current));
            }
            SubmissionOutcome::Failed { error, attempts } => {
                self.last_error = Some(error.clone());
                self.nav.phase = Phase::Failed;
                info!(session = %self.id, attempts, "Form submission failed: {error}");
            }
            SubmissionOutcome::Cancelled => {
                debug!(session = %self.id, "Submission cancelled");
            }
        }
        Ok(outcome)
    }

    /// Validate everything and submit.
    ///
    /// Dropping the future before it resolves withdraws the submission and
    /// stops any pending retry.
    pub async fn submit(&mut self) -> Result<SubmissionOutcome, FormError> {
        let pending = self.begin_submit()?;
        let guard = TransitionGuard(self);
        let report = pending.run().await;
        guard.0.complete_submit(report)
    }

    /// Withdraw the in-flight validation or submission and return to `Idle`.
    ///
    /// The ticket's work is cancelled; its report, if it still arrives,
    /// completes as `Cancelled` without touching the form. Returns false when
    /// nothing was in flight.
    pub fn cancel_pending(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.cancel.cancel();
        self.withdrawn = Some(in_flight.ticket);
        info!(
            session = %self.id,
            ticket = in_flight.ticket,
            phase = ?self.nav.phase,
            "Pending transition withdrawn"
        );
        self.nav.phase = Phase::Idle;
        true
    }

    /// Leave `Failed` so the user can try submitting again
    pub fn resume(&mut self) -> Result<(), FormError> {
        if self.closed {
            return Err(FormError::SessionClosed);
        }
        if self.nav.phase != Phase::Failed {
            return Err(FormError::NotFailed {
                phase: self.nav.phase,
            });
        }
        self.nav.phase = Phase::Idle;
        Ok(())
    }

    /// End the session, cancelling any in-flight validation, submission
    /// or backoff wait
    pub fn abandon(&mut self) {
        if self.closed {
            return;
        }
        self.cancel.cancel();
        self.closed = true;
        self.in_flight = None;
        info!(session = %self.id, phase = ?self.nav.phase, "Form session abandoned");
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
