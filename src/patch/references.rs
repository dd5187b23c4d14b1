use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::repository;
use crate::schema::{registry, EntityDescriptor, FieldKind};

/// A reference the payload delivered that cannot be applied: either the
/// value is no UUID at all or no row with that id exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InvalidPropertyReference {
    pub property: String,
    pub value: String,
}

/// A property name together with the UUID the payload delivered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyUuid {
    pub property: String,
    pub uuid: Uuid,
}

/// Reference information gathered from one payload, grouped per target
/// entity so each target costs exactly one lookup query.
#[derive(Debug, Default)]
pub struct CollectedReferences {
    pub to_null: Vec<String>,
    pub by_target: BTreeMap<&'static str, Vec<PropertyUuid>>,
    pub invalid: Vec<InvalidPropertyReference>,
}

pub fn collect_references(
    payload: &Map<String, Value>,
    descriptor: &EntityDescriptor,
) -> CollectedReferences {
    let mut collected = CollectedReferences::default();

    for field in descriptor.reference_fields() {
        let value = match payload.get(field.name) {
            Some(value) => value,
            None => continue,
        };
        let target = match field.kind {
            FieldKind::Reference(target) => target,
            _ => continue,
        };

        match value {
            Value::Null => collected.to_null.push(field.name.to_string()),
            Value::String(s) => match Uuid::parse_str(s) {
                Ok(uuid) => collected
                    .by_target
                    .entry(target)
                    .or_default()
                    .push(PropertyUuid { property: field.name.to_string(), uuid }),
                Err(_) => {
                    tracing::trace!(property = field.name, "found invalid single ref in request");
                    collected.invalid.push(InvalidPropertyReference {
                        property: field.name.to_string(),
                        value: s.clone(),
                    });
                }
            },
            other => collected.invalid.push(InvalidPropertyReference {
                property: field.name.to_string(),
                value: other.to_string(),
            }),
        }
    }

    collected
}

/// Outcome of resolving the payload's references: column assignments for
/// every resolvable reference (null clears) and the full list of invalid
/// ones.
#[derive(Debug, Default)]
pub struct ResolvedReferences {
    pub assignments: Vec<(String, Value)>,
    pub invalid: Vec<InvalidPropertyReference>,
}

/// Resolves every single-entity reference in the payload, batched with one
/// `id = ANY` query per target entity type.
pub async fn resolve_references(
    payload: &Map<String, Value>,
    descriptor: &EntityDescriptor,
    pool: &PgPool,
) -> Result<ResolvedReferences, DatabaseError> {
    let collected = collect_references(payload, descriptor);

    let mut resolved = ResolvedReferences {
        assignments: collected.to_null.into_iter().map(|p| (p, Value::Null)).collect(),
        invalid: collected.invalid,
    };

    for (target, props) in collected.by_target {
        let target_descriptor = registry().get(target).ok_or_else(|| {
            DatabaseError::QueryError(format!("unknown reference target entity: {}", target))
        })?;

        let mut ids: Vec<Uuid> = props.iter().map(|p| p.uuid).collect();
        ids.sort();
        ids.dedup();

        let found =
            repository::select_existing_ids(pool, target_descriptor.table_name, &ids).await?;

        for prop in props {
            if found.contains(&prop.uuid) {
                resolved.assignments.push((prop.property, Value::String(prop.uuid.to_string())));
            } else {
                resolved.invalid.push(InvalidPropertyReference {
                    property: prop.property,
                    value: prop.uuid.to_string(),
                });
            }
        }
    }

    Ok(resolved)
}
