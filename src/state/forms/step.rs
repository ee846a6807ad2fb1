//! Step definitions and the fixed step sequence of a form

use super::schema::{FieldRule, RuleSchema, StepSchema};
use crate::error::WiringError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// One page of a multi-step form
#[derive(Clone)]
pub struct StepDefinition {
    id: String,
    position: usize,
    fields: BTreeSet<String>,
    schema: Arc<dyn StepSchema>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl StepDefinition {
    /// Step validated by an arbitrary schema
    pub fn new(id: &str, fields: &[&str], schema: Arc<dyn StepSchema>) -> Self {
        Self {
            id: id.to_string(),
            position: 0,
            fields: fields.iter().map(|s| s.to_string()).collect(),
            schema,
        }
    }

    /// Step validated by a list of field rules
    pub fn with_rules(
        id: &str,
        fields: &[&str],
        rules: Vec<FieldRule>,
    ) -> Result<Self, WiringError> {
        let owned: BTreeSet<String> = fields.iter().map(|s| s.to_string()).collect();
        let schema = RuleSchema::new(id, &owned, rules)?;
        Ok(Self::new(id, fields, Arc::new(schema)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Zero-based position in the sequence
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn schema(&self) -> Arc<dyn StepSchema> {
        Arc::clone(&self.schema)
    }
}

/// Ordered, immutable list of steps for a form session
#[derive(Debug, Clone)]
pub struct StepSequence {
    steps: Vec<StepDefinition>,
    owners: HashMap<String, usize>,
}

impl StepSequence {
    /// Validate and freeze the sequence.
    ///
    /// Step ids must be unique and every field must belong to exactly one step.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, WiringError> {
        if steps.is_empty() {
            return Err(WiringError::EmptySequence);
        }

        let mut ids: Vec<String> = Vec::with_capacity(steps.len());
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut steps = steps;

        for (position, step) in steps.iter_mut().enumerate() {
            if ids.contains(&step.id) {
                return Err(WiringError::DuplicateStepId(step.id.clone()));
            }
            step.position = position;
            for field in &step.fields {
                if let Some(&first) = owners.get(field) {
                    return Err(WiringError::FieldOwnedTwice {
                        field: field.clone(),
                        first: ids[first].clone(),
                        second: step.id.clone(),
                    });
                }
                owners.insert(field.clone(), position);
            }
            ids.push(step.id.clone());
        }

        Ok(Self { steps, owners })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    /// Step at `index`, or a wiring error when out of range
    pub fn step(&self, index: usize) -> Result<&StepDefinition, WiringError> {
        self.steps.get(index).ok_or(WiringError::StepOutOfRange {
            index,
            step_count: self.steps.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    /// Index of the step that owns `field`
    pub fn owner_of(&self, field: &str) -> Option<usize> {
        self.owners.get(field).copied()
    }
}

impl Index<usize> for StepSequence {
    type Output = StepDefinition;

    fn index(&self, index: usize) -> &StepDefinition {
        &self.steps[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(id: &str, fields: &[&str]) -> StepDefinition {
        StepDefinition::with_rules(id, fields, Vec::new()).unwrap()
    }

    #[test]
    fn test_positions_follow_order() {
        let sequence = StepSequence::new(vec![
            plain("account", &["email"]),
            plain("profile", &["name"]),
            plain("confirm", &["terms"]),
        ])
        .unwrap();

        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.last_index(), 2);
        assert_eq!(sequence.get(1).unwrap().id(), "profile");
        assert_eq!(sequence.get(2).unwrap().position(), 2);
        assert_eq!(sequence.owner_of("terms"), Some(2));
        assert_eq!(sequence.owner_of("missing"), None);
    }

    #[test]
    fn test_empty_sequence_is_rejected() {
        assert_eq!(
            StepSequence::new(Vec::new()).unwrap_err(),
            WiringError::EmptySequence
        );
    }

    #[test]
    fn test_duplicate_step_id_is_rejected() {
        let err = StepSequence::new(vec![plain("a", &["x"]), plain("a", &["y"])]).unwrap_err();
        assert_eq!(err, WiringError::DuplicateStepId("a".to_string()));
    }

    #[test]
    fn test_field_owned_by_two_steps_is_rejected() {
        let err = StepSequence::new(vec![
            plain("a", &["x"]),
            plain("b", &["y"]),
            plain("c", &["x"]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            WiringError::FieldOwnedTwice {
                field: "x".to_string(),
                first: "a".to_string(),
                second: "c".to_string(),
            }
        );
    }

    #[test]
    fn test_step_out_of_range() {
        let sequence = StepSequence::new(vec![plain("a", &["x"])]).unwrap();
        assert!(sequence.step(0).is_ok());
        assert_eq!(
            sequence.step(3).unwrap_err(),
            WiringError::StepOutOfRange {
                index: 3,
                step_count: 1
            }
        );
    }

    #[test]
    fn test_with_rules_rejects_foreign_field() {
        let err = StepDefinition::with_rules(
            "a",
            &["x"],
            vec![FieldRule::required("y", "Required")],
        )
        .unwrap_err();
        assert!(matches!(err, WiringError::RuleReferencesUnownedField { .. }));
    }
}
