use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::database::manager::DatabaseError;
use crate::validation::errors::codes;
use crate::validation::{ValidationContext, ValidationErrors, Validator};

static EMAIL_LIST: Lazy<Regex> = Lazy::new(|| {
    let email = r"[^\s@,]+@[^\s@,]+\.[^\s@,]+";
    Regex::new(&format!(r"^\s*{email}\s*(,\s*{email}\s*)*$")).unwrap()
});

/// Business validator for fields holding an optional comma separated list
/// of e-mail addresses.
pub struct EmailListValidator {
    field: &'static str,
}

impl EmailListValidator {
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

#[async_trait]
impl Validator for EmailListValidator {
    fn name(&self) -> &'static str {
        "email-list"
    }

    async fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        errors: &mut ValidationErrors,
    ) -> Result<(), DatabaseError> {
        if let Some(Value::String(value)) = ctx.record.get(self.field) {
            if !value.trim().is_empty() && !EMAIL_LIST.is_match(value) {
                errors.add_field_error(self.field, codes::EMAILS);
            }
        }
        Ok(())
    }
}
