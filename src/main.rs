//! formflow - multi-step form sessions with validated navigation
//!
//! Demo binary: walks a three-step sign-up form against a simulated
//! backend that fails transiently a configurable number of times.
//!
//! Usage: `formflow [TRANSIENT_FAILURES]`

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use formflow::config::FormflowConfig;
use formflow::{
    FieldRule, FormSession, FormValues, StepDefinition, StepOutcome, StepSequence,
    SubmissionOutcome, SubmitError, Submitter,
};
use regex::Regex;
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Backend stand-in that answers 503 until `failures` attempts have been made
struct FlakyBackend {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Submitter for FlakyBackend {
    async fn submit(&self, values: &FormValues) -> Result<Value, SubmitError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(SubmitError::Transient(format!("503 on call {call}")));
        }
        Ok(json!({
            "account": values.text("username"),
            "calls": call,
        }))
    }
}

fn signup_form() -> Result<StepSequence> {
    let email = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?;
    let steps = StepSequence::new(vec![
        StepDefinition::with_rules(
            "account",
            &["username", "email"],
            vec![
                FieldRule::required("username", "Username is required"),
                FieldRule::min_length("username", 3, "Use at least 3 characters"),
                FieldRule::required("email", "Email is required"),
                FieldRule::pattern("email", email, "Enter a valid email"),
            ],
        )?,
        StepDefinition::with_rules(
            "profile",
            &["display_name"],
            vec![FieldRule::required("display_name", "Display name is required")],
        )?,
        StepDefinition::with_rules(
            "confirm",
            &["terms"],
            vec![FieldRule::custom(&["terms"], |values| {
                match values.get("terms").and_then(|v| v.as_bool()) {
                    Some(true) => Default::default(),
                    _ => [("terms", "Accept the terms to continue")].into_iter().collect(),
                }
            })],
        )?,
    ])?;
    Ok(steps)
}

async fn advance(session: &mut FormSession) -> Result<()> {
    match session.next().await? {
        StepOutcome::Advanced { to } => {
            println!("-> step {} ({})", to + 1, session.current_step().id());
            Ok(())
        }
        StepOutcome::Invalid(errors) => {
            for (field, message) in errors.iter() {
                println!("   {field}: {message}");
            }
            Ok(())
        }
        other => bail!("unexpected step outcome: {other:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = FormflowConfig::load().context("failed to load config")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let failures = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u32>()
            .with_context(|| format!("invalid failure count `{arg}`"))?,
        None => 1,
    };

    let policy = config.retry_policy();
    info!(?policy, failures, "Starting demo");

    let backend = Arc::new(FlakyBackend {
        failures,
        calls: AtomicU32::new(0),
    });
    let mut session = FormSession::new(signup_form()?, backend, policy);

    println!("step 1 ({})", session.current_step().id());
    session.set_field("username", "ada")?;
    session.set_field("email", "ada-at-example")?;
    advance(&mut session).await?;

    session.set_field("email", "ada@example.com")?;
    advance(&mut session).await?;

    session.set_field("display_name", "Ada Lovelace")?;
    advance(&mut session).await?;

    session.set_field("terms", true)?;

    let pending = session.begin_submit()?;
    let mut progress = pending.progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            if let (true, Some(error)) = (state.is_retrying(), &state.last_error) {
                println!("   attempt {} failed: {error}", state.attempt);
            }
        }
    });
    let report = pending.run().await;
    watcher.await?;

    match session.complete_submit(report)? {
        SubmissionOutcome::Succeeded(receipt) => println!("submitted: {receipt}"),
        SubmissionOutcome::Invalid(errors) => {
            for (field, message) in errors.iter() {
                println!("   {field}: {message}");
            }
        }
        SubmissionOutcome::Failed { error, attempts } => {
            println!("failed after {attempts} attempts: {error}");
        }
        SubmissionOutcome::Cancelled => println!("cancelled"),
    }

    Ok(())
}
