use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Message keys understood by clients; parameters fill the placeholders.
pub mod codes {
    pub const REQUIRED: &str = "error.validation.required";
    pub const MAX_LENGTH: &str = "error.validation.maxLength";
    pub const INVALID_VALUE: &str = "error.validation.invalidValue";
    pub const UNIQUE: &str = "error.validation.unique";
    pub const NOT_IN_RANGE: &str = "error.validation.notInRange";
    pub const NOT_IN_BOUNDARY: &str = "error.validation.notInSingleBoundary";
    pub const EMAILS: &str = "error.validation.emails";
}

/// One validation violation: a translatable message code plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl ValidationError {
    pub fn new(code: &'static str) -> Self {
        Self { code, params: Vec::new() }
    }

    pub fn with_params(code: &'static str, params: Vec<Value>) -> Self {
        Self { code, params }
    }
}

/// Global and field specific validation errors, accumulated across the
/// schema validator and business validators so a response can report every
/// violation at once. Equal errors are joined.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    pub global: Vec<ValidationError>,
    pub fields: BTreeMap<String, Vec<ValidationError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global_error(&mut self, code: &'static str) {
        let error = ValidationError::new(code);
        if !self.global.contains(&error) {
            self.global.push(error);
        }
    }

    pub fn add_field_error(&mut self, field: &str, code: &'static str) {
        self.add_field_error_with(field, code, Vec::new());
    }

    pub fn add_field_error_with(&mut self, field: &str, code: &'static str, params: Vec<Value>) {
        let errors = self.fields.entry(field.to_string()).or_default();
        let error = ValidationError::with_params(code, params);
        if !errors.contains(&error) {
            errors.push(error);
        }
    }

    /// Replaces any existing errors for the field with the given one.
    pub fn set_field_error(&mut self, field: &str, code: &'static str, params: Vec<Value>) {
        self.clear_field(field);
        self.add_field_error_with(field, code, params);
    }

    pub fn add_unique_error(&mut self, field: &str) {
        self.add_field_error(field, codes::UNIQUE);
    }

    /// Adds a required error when the value is missing, null or a blank
    /// string. Returns whether an error was added.
    pub fn decide_required_error(&mut self, field: &str, value: Option<&Value>) -> bool {
        let missing = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            self.add_field_error(field, codes::REQUIRED);
        }
        missing
    }

    /// Adds a maxLength error when the value exceeds the limit.
    pub fn decide_length_error(&mut self, field: &str, value: &str, max_length: usize) -> bool {
        if value.chars().count() > max_length {
            self.add_field_error_with(field, codes::MAX_LENGTH, vec![Value::from(max_length)]);
            return true;
        }
        false
    }

    /// Adds a range error when the value violates the given inclusive
    /// bounds. Missing bounds are not checked; a single bound reports a
    /// boundary error instead of a range one.
    pub fn decide_range_error(
        &mut self,
        field: &str,
        value: f64,
        min: Option<Decimal>,
        max: Option<Decimal>,
    ) -> bool {
        let min_f = min.and_then(|d| d.to_f64());
        let max_f = max.and_then(|d| d.to_f64());

        match (min_f, max_f) {
            (Some(lo), Some(hi)) => {
                if value < lo || value > hi {
                    self.add_field_error_with(
                        field,
                        codes::NOT_IN_RANGE,
                        vec![Value::from(lo), Value::from(hi)],
                    );
                    return true;
                }
            }
            (Some(lo), None) => {
                if value < lo {
                    self.add_field_error_with(
                        field,
                        codes::NOT_IN_BOUNDARY,
                        vec![Value::from(">="), Value::from(lo)],
                    );
                    return true;
                }
            }
            (None, Some(hi)) => {
                if value > hi {
                    self.add_field_error_with(
                        field,
                        codes::NOT_IN_BOUNDARY,
                        vec![Value::from("<="), Value::from(hi)],
                    );
                    return true;
                }
            }
            (None, None) => {}
        }
        false
    }

    pub fn has_field_errors(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.fields.is_empty()
    }

    pub fn clear_field(&mut self, field: &str) {
        self.fields.remove(field);
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.fields.clear();
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} global, {} field errors", self.global.len(), self.fields.len())
    }
}
