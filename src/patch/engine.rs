use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::repository;
use crate::entity::{EntityDiff, EntityRecord};
use crate::hooks::{self, ChangeEvent, ChangeOperation};
use crate::middleware::AuthUser;
use crate::patch::mapper;
use crate::patch::references::{self, InvalidPropertyReference};
use crate::schema::EntityDescriptor;
use crate::validation::{SchemaValidator, ValidationContext, ValidationErrors, Validator};

/// Columns an update must never touch; the version bump is handled by the
/// repository itself.
const IMMUTABLE_COLUMNS: &[&str] = &["id", "version", "created_at", "created_by"];

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("payload contains invalid references")]
    InvalidReference(Vec<InvalidPropertyReference>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of a committed create or patch: the stored record, the audit
/// diff that was handed to the change hooks, and whether it was a create.
#[derive(Debug)]
pub struct PatchOutcome {
    pub record: EntityRecord,
    pub diff: EntityDiff,
    pub created: bool,
}

/// Creates a new entity from a property-bag payload.
pub async fn create_item(
    descriptor: &EntityDescriptor,
    payload: &Map<String, Value>,
    actor: &AuthUser,
    pool: &PgPool,
) -> Result<PatchOutcome, PatchError> {
    let record = new_record(descriptor, actor);
    perform_update(descriptor, record, payload, actor, true, pool).await
}

/// Performs a partial update of an existing entity.
pub async fn patch_item(
    descriptor: &EntityDescriptor,
    id: Uuid,
    payload: &Map<String, Value>,
    actor: &AuthUser,
    pool: &PgPool,
) -> Result<PatchOutcome, PatchError> {
    let row = repository::find_by_id(pool, descriptor, id)
        .await?
        .ok_or_else(|| PatchError::NotFound(format!("{} {} not found", descriptor.name, id)))?;
    let record = EntityRecord::from_row(descriptor.name, row);
    perform_update(descriptor, record, payload, actor, false, pool).await
}

/// The shared create/patch flow: snapshot, map simple fields, resolve
/// references, validate, save transactionally, notify hooks.
async fn perform_update(
    descriptor: &EntityDescriptor,
    mut record: EntityRecord,
    payload: &Map<String, Value>,
    actor: &AuthUser,
    create: bool,
    pool: &PgPool,
) -> Result<PatchOutcome, PatchError> {
    let previous = if create { None } else { Some(record.snapshot()) };

    // 1. simple fields, with type coercion; every bad field reported at once
    let mut errors = ValidationErrors::new();
    mapper::map_simple_fields(payload, descriptor, &mut record, &mut errors);
    if !errors.is_empty() {
        return Err(PatchError::Validation(errors));
    }

    // 2. single references, batched per target entity
    let resolved = references::resolve_references(payload, descriptor, pool).await?;
    if !resolved.invalid.is_empty() {
        return Err(PatchError::InvalidReference(resolved.invalid));
    }
    for (property, value) in resolved.assignments {
        record.set(property, value);
    }

    // 3. schema-derived rules first, then the entity's business validators
    {
        let ctx = ValidationContext {
            descriptor,
            record: &record,
            previous: previous.as_ref(),
            payload,
            pool,
        };
        SchemaValidator.validate(&ctx, &mut errors).await?;
        for validator in &descriptor.validators {
            validator.validate(&ctx, &mut errors).await?;
        }
    }
    if !errors.is_empty() {
        return Err(PatchError::Validation(errors));
    }

    // 4. audit stamp and transactional save
    if !create {
        record.set("updated_at", now_utc());
        record.set("updated_by", actor.username.clone());
    }
    save(descriptor, &mut record, create, pool).await?;

    // 5. audit diff for downstream hooks, after commit
    let diff = EntityDiff::new(descriptor.name, previous, record.snapshot(), payload.clone());
    let event = ChangeEvent {
        entity: descriptor.name.to_string(),
        operation: if create { ChangeOperation::Created } else { ChangeOperation::Updated },
        entity_id: record.id(),
        actor: actor.username.clone(),
        diff: diff.clone(),
    };
    hooks::registry().notify(&event).await;

    Ok(PatchOutcome { record, diff, created: create })
}

fn new_record(descriptor: &EntityDescriptor, actor: &AuthUser) -> EntityRecord {
    let mut record = EntityRecord::new(descriptor.name);
    let now = now_utc();

    record.set("id", Uuid::new_v4().to_string());
    record.set("version", 0);
    record.set("active", descriptor.active_default);
    record.set("deleted", false);
    record.set("created_at", now.clone());
    record.set("updated_at", now);
    record.set("created_by", actor.username.clone());
    record.set("updated_by", actor.username.clone());

    for field in &descriptor.fields {
        if let Some(default) = &field.default {
            record.set(field.name, default.clone());
        }
    }

    record
}

fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn save(
    descriptor: &EntityDescriptor,
    record: &mut EntityRecord,
    create: bool,
    pool: &PgPool,
) -> Result<(), PatchError> {
    let mut tx = pool.begin().await.map_err(DatabaseError::from)?;

    if create {
        repository::insert(&mut tx, descriptor, record).await?;
    } else {
        let id = record
            .id()
            .ok_or_else(|| DatabaseError::QueryError("loaded record has no id".to_string()))?;
        let expected_version = record.original_version().unwrap_or(0);

        let changes = record.changes();
        let mut columns: Vec<(String, Value)> = Vec::new();
        for name in changes.changed_field_names() {
            if IMMUTABLE_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let value = record.get(&name).cloned().unwrap_or(Value::Null);
            columns.push((name, value));
        }

        let rows = repository::update(&mut tx, descriptor, id, expected_version, &columns).await?;
        if rows == 0 {
            return Err(PatchError::Conflict(format!(
                "{} {} was modified concurrently",
                descriptor.name, id
            )));
        }
        record.set("version", expected_version + 1);
    }

    tx.commit().await.map_err(DatabaseError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> AuthUser {
        AuthUser { user_id: Uuid::new_v4(), username: "tester".to_string() }
    }

    #[test]
    fn new_record_carries_base_columns_and_defaults() {
        let descriptor = crate::schema::registry().get("laboratories").unwrap();
        let record = new_record(descriptor, &actor());

        assert!(record.id().is_some());
        assert_eq!(record.version(), Some(0));
        assert_eq!(record.get("active"), Some(&Value::Bool(true)));
        assert_eq!(record.get("deleted"), Some(&Value::Bool(false)));
        assert_eq!(record.get("created_by"), Some(&Value::String("tester".to_string())));
        // descriptor defaults
        assert_eq!(record.get("result_value"), Some(&Value::from(0.0)));
        assert_eq!(record.get("lab_switch_on"), Some(&Value::Bool(false)));
    }

    #[test]
    fn users_default_to_inactive() {
        let descriptor = crate::schema::registry().get("users").unwrap();
        let record = new_record(descriptor, &actor());
        assert_eq!(record.get("active"), Some(&Value::Bool(false)));
        assert_eq!(record.get("language"), Some(&Value::String("en-US".to_string())));
    }
}
