//! Step schema contract and rule combinators

use super::field::FieldValue;
use super::form_state::{FieldErrors, FormValues};
use crate::error::WiringError;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outcome of validating one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: FieldErrors,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: FieldErrors::new(),
        }
    }

    /// Valid exactly when there are no errors
    pub fn from_errors(errors: FieldErrors) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Fail if any reported field is outside `owned`
    pub fn check_ownership(&self, step: &str, owned: &BTreeSet<String>) -> Result<(), WiringError> {
        match self.errors.fields().find(|field| !owned.contains(*field)) {
            Some(field) => Err(WiringError::UnownedFieldError {
                step: step.to_string(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Validator bound to one step.
///
/// Implementations must be pure: the same values always give the same
/// result, and only fields in `owned` may appear in the returned errors.
/// The future may suspend (e.g. a uniqueness lookup) but must not mutate
/// anything the form can observe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepSchema: Send + Sync {
    async fn validate(&self, values: &FormValues, owned: &BTreeSet<String>) -> ValidationResult;
}

type CheckFn = dyn Fn(&FormValues) -> FieldErrors + Send + Sync;

/// One `(field set, validator)` pair.
///
/// The check may read any value (including other steps' fields) but may only
/// report errors for the fields it declares.
#[derive(Clone)]
pub struct FieldRule {
    fields: BTreeSet<String>,
    check: Arc<CheckFn>,
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl FieldRule {
    /// Rule over several fields with an arbitrary check
    pub fn custom<F>(fields: &[&str], check: F) -> Self
    where
        F: Fn(&FormValues) -> FieldErrors + Send + Sync + 'static,
    {
        Self {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            check: Arc::new(check),
        }
    }

    /// Field must be present and not blank
    pub fn required(field: &str, message: &str) -> Self {
        let name = field.to_string();
        let message = message.to_string();
        Self::custom(&[field], move |values| match values.get(&name) {
            Some(value) if !value.is_blank() => FieldErrors::new(),
            _ => single(&name, &message),
        })
    }

    /// Text field must match `regex` when set
    pub fn pattern(field: &str, regex: Regex, message: &str) -> Self {
        let name = field.to_string();
        let message = message.to_string();
        Self::custom(&[field], move |values| match values.get(&name) {
            Some(FieldValue::Text(text)) if !text.is_empty() && !regex.is_match(text) => {
                single(&name, &message)
            }
            _ => FieldErrors::new(),
        })
    }

    /// Text field must have at least `min` characters when set
    pub fn min_length(field: &str, min: usize, message: &str) -> Self {
        let name = field.to_string();
        let message = message.to_string();
        Self::custom(&[field], move |values| match values.text(&name) {
            Some(text) if !text.is_empty() && text.chars().count() < min => {
                single(&name, &message)
            }
            _ => FieldErrors::new(),
        })
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    fn run(&self, values: &FormValues) -> FieldErrors {
        (self.check)(values)
    }
}

fn single(field: &str, message: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field, message);
    errors
}

/// Combine errors from several rules; the first message for a field wins
pub fn merge_errors(results: impl IntoIterator<Item = FieldErrors>) -> FieldErrors {
    let mut merged = FieldErrors::new();
    for errors in results {
        for (field, message) in errors.iter() {
            if !merged.contains(field) {
                merged.insert(field, message);
            }
        }
    }
    merged
}

/// Step schema built from a list of field rules
#[derive(Debug, Clone)]
pub struct RuleSchema {
    step: String,
    rules: Vec<FieldRule>,
}

impl RuleSchema {
    /// Build a schema for `step`, rejecting rules that target fields the step
    /// does not own
    pub fn new(
        step: &str,
        owned: &BTreeSet<String>,
        rules: Vec<FieldRule>,
    ) -> Result<Self, WiringError> {
        for rule in &rules {
            if let Some(field) = rule.fields.iter().find(|f| !owned.contains(*f)) {
                return Err(WiringError::RuleReferencesUnownedField {
                    step: step.to_string(),
                    field: field.clone(),
                });
            }
        }
        Ok(Self {
            step: step.to_string(),
            rules,
        })
    }

    /// Evaluate every rule synchronously
    pub fn evaluate(&self, values: &FormValues) -> ValidationResult {
        ValidationResult::from_errors(merge_errors(
            self.rules.iter().map(|rule| rule.run(values)),
        ))
    }
}

#[async_trait]
impl StepSchema for RuleSchema {
    async fn validate(&self, values: &FormValues, _owned: &BTreeSet<String>) -> ValidationResult {
        let result = self.evaluate(values);
        debug!(step = %self.step, errors = result.errors.len(), "Rules evaluated");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn email_regex() -> Regex {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap()
    }

    mod rules {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_required_rejects_missing_and_blank() {
            let rule = FieldRule::required("name", "Name is required");
            let empty = FormValues::new();
            let blank: FormValues = [("name", "  ")].into_iter().collect();
            let filled: FormValues = [("name", "Ada")].into_iter().collect();

            assert_eq!(rule.run(&empty).get("name"), Some("Name is required"));
            assert!(rule.run(&blank).contains("name"));
            assert!(rule.run(&filled).is_empty());
        }

        #[test]
        fn test_pattern_ignores_empty_values() {
            let rule = FieldRule::pattern("email", email_regex(), "Invalid email");
            let bad: FormValues = [("email", "bad")].into_iter().collect();
            let good: FormValues = [("email", "a@b.com")].into_iter().collect();
            let empty: FormValues = [("email", "")].into_iter().collect();

            assert!(rule.run(&bad).contains("email"));
            assert!(rule.run(&good).is_empty());
            assert!(rule.run(&empty).is_empty());
        }

        #[test]
        fn test_min_length_counts_chars() {
            let rule = FieldRule::min_length("password", 4, "Too short");
            let short: FormValues = [("password", "äöü")].into_iter().collect();
            let long: FormValues = [("password", "äöüß")].into_iter().collect();
            assert!(rule.run(&short).contains("password"));
            assert!(rule.run(&long).is_empty());
        }
    }

    mod merging {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_first_message_wins() {
            let merged = merge_errors(vec![
                [("a", "first")].into_iter().collect(),
                [("a", "second"), ("b", "other")].into_iter().collect(),
            ]);
            let expected: FieldErrors = [("a", "first"), ("b", "other")].into_iter().collect();
            assert_eq!(merged, expected);
        }

        #[test]
        fn test_empty_input_gives_no_errors() {
            assert!(merge_errors(Vec::new()).is_empty());
        }
    }

    mod rule_schema {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_new_rejects_rule_for_unowned_field() {
            let err = RuleSchema::new(
                "contact",
                &owned(&["email"]),
                vec![FieldRule::required("phone", "Required")],
            )
            .unwrap_err();
            assert_eq!(
                err,
                WiringError::RuleReferencesUnownedField {
                    step: "contact".to_string(),
                    field: "phone".to_string()
                }
            );
        }

        #[test]
        fn test_evaluate_combines_rules() {
            let schema = RuleSchema::new(
                "contact",
                &owned(&["email"]),
                vec![
                    FieldRule::required("email", "Email is required"),
                    FieldRule::pattern("email", email_regex(), "Invalid email"),
                ],
            )
            .unwrap();

            let missing = schema.evaluate(&FormValues::new());
            assert!(!missing.valid);
            assert_eq!(missing.errors.get("email"), Some("Email is required"));

            let bad = schema.evaluate(&[("email", "bad")].into_iter().collect());
            assert_eq!(bad.errors.get("email"), Some("Invalid email"));

            let good = schema.evaluate(&[("email", "a@b.com")].into_iter().collect());
            assert_eq!(good, ValidationResult::ok());
        }

        #[tokio::test]
        async fn test_validate_is_deterministic() {
            let fields = owned(&["email"]);
            let schema = RuleSchema::new(
                "contact",
                &fields,
                vec![FieldRule::required("email", "Required")],
            )
            .unwrap();
            let values = FormValues::new();
            let first = schema.validate(&values, &fields).await;
            let second = schema.validate(&values, &fields).await;
            assert_eq!(first, second);
        }

        #[test]
        fn test_check_ownership() {
            let result = ValidationResult::from_errors([("b", "x")].into_iter().collect());
            assert!(result.check_ownership("s", &owned(&["b"])).is_ok());
            assert!(result.check_ownership("s", &owned(&["a"])).is_err());
        }
    }
}
