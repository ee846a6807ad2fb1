//! Form state store: accumulated values, field errors and touched flags

use super::field::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Values for every field of the form, across all steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormValues(BTreeMap<String, FieldValue>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Text value of a field, None when unset or not text
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of the values limited to the given field names
    pub fn restrict(&self, fields: &BTreeSet<String>) -> FormValues {
        FormValues(
            self.0
                .iter()
                .filter(|(name, _)| fields.contains(*name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FormValues(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Human-readable error message per field.
///
/// A missing key means the field is valid or has not been validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.0.insert(name.into(), message.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FieldErrors(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// In-memory owner of values, errors and touched flags for one session.
///
/// Every `set_field` stamps the field with a new generation from a
/// monotonically increasing counter, so pending validations can tell whether
/// the values they checked are still current.
#[derive(Debug, Clone, Default)]
pub struct FormStore {
    values: FormValues,
    errors: FieldErrors,
    touched: BTreeSet<String>,
    generations: HashMap<String, u64>,
    generation: u64,
}

impl FormStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with defaults. Defaults are neither touched nor
    /// stamped with a generation.
    pub fn with_values(values: FormValues) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Overwrite a value, mark it touched and drop its stale error.
    ///
    /// Returns the generation stamped on the field.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> u64 {
        self.values.insert(name, value);
        self.touched.insert(name.to_string());
        self.errors.remove(name);
        self.bump(name)
    }

    /// Merge values from a saved draft. Restored fields lose their errors
    /// and count as changed for pending validations.
    pub fn restore(&mut self, values: FormValues) {
        for (name, value) in values.0 {
            self.errors.remove(&name);
            self.bump(&name);
            self.values.0.insert(name, value);
        }
    }

    fn bump(&mut self, name: &str) -> u64 {
        self.generation += 1;
        self.generations.insert(name.to_string(), self.generation);
        self.generation
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name)
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.contains(name)
    }

    /// Merge errors in; fields not mentioned keep their current state
    pub fn apply_errors(&mut self, errors: &FieldErrors) {
        for (name, message) in errors.iter() {
            self.errors.insert(name, message);
        }
    }

    /// Remove errors for exactly the given fields
    pub fn clear_errors<'a>(&mut self, fields: impl IntoIterator<Item = &'a String>) {
        for name in fields {
            self.errors.remove(name);
        }
    }

    /// Current value of the store-wide generation counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `name` was stamped after `generation`
    pub fn changed_since(&self, name: &str, generation: u64) -> bool {
        self.generations.get(name).is_some_and(|stamp| *stamp > generation)
    }

    /// Latest generation stamped on any of the given fields (0 if none were set)
    pub fn generation_of<'a>(&self, fields: impl IntoIterator<Item = &'a String>) -> u64 {
        fields
            .into_iter()
            .filter_map(|name| self.generations.get(name))
            .copied()
            .max()
            .unwrap_or(0)
    }
}
