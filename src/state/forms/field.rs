//! Form field value objects

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to an uploaded file.
///
/// Transport of the file contents is handled elsewhere; the form only keeps
/// enough to identify and display the attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: Uuid,
    pub file_name: String,
    pub size_bytes: u64,
}

impl FileHandle {
    /// Create a handle with a fresh identifier
    pub fn new(file_name: &str, size_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            size_bytes,
        }
    }
}

/// Type-safe field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    File(FileHandle),
    List(Vec<FieldValue>),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}

impl FieldValue {
    /// Create a text value
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Get the text value (None for non-text values)
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// True for empty text, whitespace-only text and empty lists
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Get the display value for rendering
    pub fn display_value(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(true) => "Yes".to_string(),
            FieldValue::Bool(false) => "No".to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::File(f) => f.file_name.clone(),
            FieldValue::List(items) => items
                .iter()
                .map(FieldValue::display_value)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<FileHandle> for FieldValue {
    fn from(value: FileHandle) -> Self {
        FieldValue::File(value)
    }
}

/// Everything a rendering adapter needs to draw one field.
///
/// Descriptors are read-only snapshots; edits go back through
/// `FormSession::set_field` using `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor<'a> {
    pub name: &'a str,
    /// Index of the step that owns the field
    pub step: usize,
    pub value: Option<&'a FieldValue>,
    pub error: Option<&'a str>,
    pub touched: bool,
}

impl FieldDescriptor<'_> {
    /// Text shown in the input, empty when the field has no value yet
    pub fn display_value(&self) -> String {
        self.value.map(FieldValue::display_value).unwrap_or_default()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty_text() {
        assert_eq!(FieldValue::default(), FieldValue::Text(String::new()));
    }

    #[test]
    fn test_is_blank() {
        assert!(FieldValue::text("   ").is_blank());
        assert!(FieldValue::List(vec![]).is_blank());
        assert!(!FieldValue::text("x").is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_accessors_return_none_for_other_variants() {
        let value = FieldValue::Number(3.0);
        assert_eq!(value.as_number(), Some(3.0));
        assert!(value.as_text().is_none());
        assert!(value.as_bool().is_none());
        assert!(value.as_date().is_none());
    }

    #[test]
    fn test_display_value() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(FieldValue::Date(date).display_value(), "2024-02-29");
        assert_eq!(FieldValue::Bool(true).display_value(), "Yes");
        assert_eq!(
            FieldValue::List(vec!["a".into(), FieldValue::Number(2.0)]).display_value(),
            "a, 2"
        );
        assert_eq!(
            FieldValue::File(FileHandle::new("cv.pdf", 1024)).display_value(),
            "cv.pdf"
        );
    }

    #[test]
    fn test_serde_tagged_representation() {
        let json = serde_json::to_value(FieldValue::Bool(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "bool", "value": true}));
        let parsed: FieldValue = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, FieldValue::Bool(true));
    }

    #[test]
    fn test_descriptor_display_without_value() {
        let descriptor = FieldDescriptor {
            name: "email",
            step: 1,
            value: None,
            error: Some("Required"),
            touched: false,
        };
        assert_eq!(descriptor.display_value(), "");
        assert!(descriptor.has_error());
    }
}
