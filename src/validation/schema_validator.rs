use async_trait::async_trait;
use serde_json::Value;

use crate::database::manager::DatabaseError;
use crate::database::repository;
use crate::entity::EntityRecord;
use crate::schema::EntityDescriptor;
use crate::validation::errors::codes;
use crate::validation::{ValidationContext, ValidationErrors, Validator};

/// Validator derived entirely from the entity descriptor: required,
/// max-length and range restrictions plus unique constraints including
/// multi-field groups. All unique groups are folded into one query.
pub struct SchemaValidator;

#[async_trait]
impl Validator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    async fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        errors: &mut ValidationErrors,
    ) -> Result<(), DatabaseError> {
        validate_field_restrictions(ctx.descriptor, ctx.record, errors);
        validate_unique_constraints(ctx, errors).await
    }
}

pub(crate) fn validate_field_restrictions(
    descriptor: &EntityDescriptor,
    record: &EntityRecord,
    errors: &mut ValidationErrors,
) {
    for field in &descriptor.fields {
        let value = record.get(field.name);

        if field.required {
            errors.decide_required_error(field.name, value);
        }

        match value {
            Some(Value::String(s)) => {
                if let Some(max) = field.max_length {
                    errors.decide_length_error(field.name, s, max);
                }
            }
            Some(Value::Array(items)) => {
                if let Some(max) = field.max_length {
                    let too_long = items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .any(|s| !s.is_empty() && s.chars().count() > max);
                    if too_long {
                        errors.add_field_error_with(
                            field.name,
                            codes::MAX_LENGTH,
                            vec![Value::from(max)],
                        );
                    }
                }
            }
            Some(Value::Number(n)) => {
                if field.minimum.is_some() || field.maximum.is_some() {
                    if let Some(v) = n.as_f64() {
                        errors.decide_range_error(field.name, v, field.minimum, field.maximum);
                    }
                }
            }
            _ => {}
        }
    }
}

/// The uniqueness probe built from every checkable group: an OR-combined
/// predicate, its bind parameters and the indexes of the groups it covers.
#[derive(Debug)]
pub(crate) struct UniqueProbe {
    pub where_sql: String,
    pub params: Vec<Value>,
    pub group_indexes: Vec<usize>,
}

/// Builds the combined predicate. Groups with a pending field error and
/// groups whose members are all null are skipped; `None` when nothing needs
/// checking.
pub(crate) fn build_unique_probe(
    descriptor: &EntityDescriptor,
    record: &EntityRecord,
    errors: &ValidationErrors,
) -> Option<UniqueProbe> {
    let groups = descriptor.unique_groups();
    let mut terms: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    let mut group_indexes: Vec<usize> = Vec::new();

    for (idx, group) in groups.iter().enumerate() {
        // an already invalid member makes the probe meaningless
        if group.iter().any(|f| errors.has_field_errors(f.name)) {
            continue;
        }

        let mut exprs: Vec<String> = Vec::new();
        let mut group_params: Vec<Value> = Vec::new();
        let mut nulls = 0usize;

        for field in group {
            let value = record.get(field.name).cloned().filter(|v| !v.is_null());
            match value {
                None => {
                    nulls += 1;
                    exprs.push(format!("\"{}\" IS NULL", field.name));
                }
                Some(v) => {
                    group_params.push(v);
                    exprs.push(format!(
                        "\"{}\" = ${}::{}",
                        field.name,
                        params.len() + group_params.len(),
                        field.kind.sql_cast()
                    ));
                }
            }
        }

        // unique constraints are ignored when all related values are null
        if nulls == group.len() {
            continue;
        }

        params.extend(group_params);
        let term = if exprs.len() > 1 {
            format!("({})", exprs.join(" AND "))
        } else {
            exprs.remove(0)
        };
        terms.push(term);
        group_indexes.push(idx);
    }

    if terms.is_empty() {
        return None;
    }

    Some(UniqueProbe { where_sql: terms.join(" OR "), params, group_indexes })
}

async fn validate_unique_constraints(
    ctx: &ValidationContext<'_>,
    errors: &mut ValidationErrors,
) -> Result<(), DatabaseError> {
    let probe = match build_unique_probe(ctx.descriptor, ctx.record, errors) {
        Some(probe) => probe,
        None => return Ok(()),
    };

    let rows = repository::select_where(
        ctx.pool,
        ctx.descriptor.table_name,
        &probe.where_sql,
        &probe.params,
    )
    .await?;

    let groups = ctx.descriptor.unique_groups();
    let own_id = ctx.record.get("id").and_then(|v| v.as_str()).map(str::to_owned);

    for row in &rows {
        // skip self match
        let row_id = row.get("id").and_then(|v| v.as_str());
        if row_id.is_some() && row_id == own_id.as_deref() {
            continue;
        }

        for &idx in &probe.group_indexes {
            let group = &groups[idx];
            let violated =
                group.iter().all(|f| values_match(row.get(f.name), ctx.record.get(f.name)));
            if !violated {
                continue;
            }
            for field in group {
                if ctx.descriptor.ignore_reference_unique_errors && field.kind.is_reference() {
                    continue;
                }
                errors.add_unique_error(field.name);
            }
        }
    }

    Ok(())
}

/// Compares a database value with the record's value for violation
/// attribution. Nulls match nulls; numbers compare numerically.
pub(crate) fn values_match(db: Option<&Value>, ours: Option<&Value>) -> bool {
    let db = db.filter(|v| !v.is_null());
    let ours = ours.filter(|v| !v.is_null());
    match (db, ours) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if a == b {
                return true;
            }
            match (a, b) {
                (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn record_with(pairs: Vec<(&str, Value)>) -> EntityRecord {
        let mut record = EntityRecord::new("things");
        for (k, v) in pairs {
            record.set(k, v);
        }
        record
    }

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("things", "things")
            .field(FieldDescriptor::string("name").required().max_length(8).unique())
            .field(
                FieldDescriptor::float("score")
                    .minimum(Decimal::ZERO)
                    .maximum(Decimal::from(100)),
            )
            .field(FieldDescriptor::string("code"))
            .field(FieldDescriptor::reference("owner", "users"))
            .unique_group(&["code", "owner"])
    }

    #[test]
    fn restrictions_catch_required_length_and_range() {
        let descriptor = descriptor();
        let record =
            record_with(vec![("name", json!("far-too-long")), ("score", json!(150.0))]);
        let mut errors = ValidationErrors::new();
        validate_field_restrictions(&descriptor, &record, &mut errors);

        assert_eq!(errors.fields["name"][0].code, codes::MAX_LENGTH);
        assert_eq!(errors.fields["score"][0].code, codes::NOT_IN_RANGE);

        let mut errors = ValidationErrors::new();
        let record = record_with(vec![("score", json!(50.0))]);
        validate_field_restrictions(&descriptor, &record, &mut errors);
        assert_eq!(errors.fields["name"][0].code, codes::REQUIRED);
    }

    #[test]
    fn probe_combines_groups_with_or() {
        let descriptor = descriptor();
        let record = record_with(vec![
            ("name", json!("lab-a")),
            ("code", json!("A1")),
            ("owner", json!("11111111-1111-1111-1111-111111111111")),
        ]);
        let probe = build_unique_probe(&descriptor, &record, &ValidationErrors::new()).unwrap();

        assert_eq!(
            probe.where_sql,
            "\"name\" = $1::text OR (\"code\" = $2::text AND \"owner\" = $3::uuid)"
        );
        assert_eq!(probe.params.len(), 3);
        assert_eq!(probe.group_indexes, vec![0, 1]);
    }

    #[test]
    fn probe_uses_is_null_for_null_members() {
        let descriptor = descriptor();
        let record = record_with(vec![("name", json!("lab-a")), ("code", json!("A1"))]);
        let probe = build_unique_probe(&descriptor, &record, &ValidationErrors::new()).unwrap();

        assert_eq!(
            probe.where_sql,
            "\"name\" = $1::text OR (\"code\" = $2::text AND \"owner\" IS NULL)"
        );
        assert_eq!(probe.params.len(), 2);
    }

    #[test]
    fn probe_skips_all_null_groups_and_errored_groups() {
        let descriptor = descriptor();

        // group (code, owner) entirely null -> only the name group remains
        let record = record_with(vec![("name", json!("lab-a"))]);
        let probe = build_unique_probe(&descriptor, &record, &ValidationErrors::new()).unwrap();
        assert_eq!(probe.where_sql, "\"name\" = $1::text");
        assert_eq!(probe.group_indexes, vec![0]);

        // a field error on name suppresses the name group
        let record = record_with(vec![("name", json!("lab-a")), ("code", json!("A1"))]);
        let mut errors = ValidationErrors::new();
        errors.add_field_error("name", codes::MAX_LENGTH);
        let probe = build_unique_probe(&descriptor, &record, &errors).unwrap();
        assert_eq!(probe.group_indexes, vec![1]);
    }

    #[test]
    fn probe_is_none_when_nothing_checkable() {
        let descriptor = descriptor();
        let record = record_with(vec![]);
        assert!(build_unique_probe(&descriptor, &record, &ValidationErrors::new()).is_none());
    }

    #[test]
    fn values_match_compares_numbers_numerically() {
        assert!(values_match(Some(&json!(1.0)), Some(&json!(1))));
        assert!(values_match(None, Some(&Value::Null)));
        assert!(!values_match(Some(&json!("a")), Some(&json!("b"))));
        assert!(!values_match(Some(&json!("a")), None));
    }
}
