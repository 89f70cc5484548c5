//! Field-level validation errors.
//!
//! Serialized as a map from field name to the list of messages for that
//! field, e.g. `{"port": ["Ensure this value is greater than or equal to 1."]}`.
//! Errors that do not belong to a single field go under `non_field_errors`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an error set holding a single message.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(value)` when no error was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub(crate) const REQUIRED: &str = "This field may not be blank.";

/// Records a blank-field error and a length error for `value`.
pub(crate) fn check_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: &str,
    required: bool,
    max_len: usize,
) {
    if required && value.trim().is_empty() {
        errors.add(field, REQUIRED);
    }
    if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this field has no more than {} characters.", max_len),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("host", "This field may not be blank.");
        errors.add("host", "Enter a valid host name.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "host": ["This field may not be blank.", "Enter a valid host name."]
            })
        );
    }

    #[test]
    fn into_result_only_fails_when_populated() {
        assert_eq!(ValidationErrors::new().into_result(3), Ok(3));
        let err = ValidationErrors::single("name", "taken").into_result(3);
        assert!(err.unwrap_err().contains("name"));
    }

    #[test]
    fn check_text_reports_blank_and_length() {
        let mut errors = ValidationErrors::new();
        check_text(&mut errors, "name", "   ", true, 100);
        check_text(&mut errors, "title", &"x".repeat(6), false, 5);
        check_text(&mut errors, "note", "", false, 5);
        assert_eq!(errors.get("name"), Some(&[REQUIRED.to_string()][..]));
        assert!(errors.contains("title"));
        assert!(!errors.contains("note"));
    }
}
