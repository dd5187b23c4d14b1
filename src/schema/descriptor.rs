use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

use crate::validation::Validator;

/// Field type as understood by the payload mapper and the SQL layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    /// Calendar date without time, ISO `YYYY-MM-DD`
    Date,
    /// Local datetime, ISO `YYYY-MM-DDTHH:MM:SS`
    DateTime,
    Url,
    Uuid,
    Enum(Vec<&'static str>),
    /// List of strings; accepted as a JSON array or a semicolon separated string
    StringList,
    /// Single reference to another entity, delivered as a UUID string.
    /// Carries the target entity name.
    Reference(&'static str),
}

impl FieldKind {
    /// Postgres cast used when binding a JSON value for this kind.
    pub fn sql_cast(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Url | FieldKind::Enum(_) => "text",
            FieldKind::Integer => "int8",
            FieldKind::Float => "float8",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateTime => "timestamp",
            FieldKind::Uuid | FieldKind::Reference(_) => "uuid",
            FieldKind::StringList => "text[]",
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Reference(_))
    }
}

/// Declarative constraints for a single entity field.
///
/// This is the registry counterpart of schema annotations on a persistent
/// class: `required` maps to a not-null validation error, `nullable: false`
/// rejects an explicit null in a payload (primitive fields), `max_length`
/// applies to strings and string lists, `unique` creates a single-field
/// unique group.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    pub max_length: Option<usize>,
    pub minimum: Option<Decimal>,
    pub maximum: Option<Decimal>,
    pub unique: bool,
    /// Excluded from API output (e.g. password digests)
    pub hidden: bool,
    /// Value used when a create payload omits the field
    pub default: Option<Value>,
    /// Applied to the coerced value before it is stored (e.g. password digesting)
    pub transform: Option<fn(Value) -> Value>,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            nullable: true,
            max_length: None,
            minimum: None,
            maximum: None,
            unique: false,
            hidden: false,
            default: None,
            transform: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: &'static str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn datetime(name: &'static str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn url(name: &'static str) -> Self {
        Self::new(name, FieldKind::Url)
    }

    pub fn enumeration(name: &'static str, values: Vec<&'static str>) -> Self {
        Self::new(name, FieldKind::Enum(values))
    }

    pub fn string_list(name: &'static str) -> Self {
        Self::new(name, FieldKind::StringList)
    }

    pub fn reference(name: &'static str, target: &'static str) -> Self {
        Self::new(name, FieldKind::Reference(target))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Explicit nulls are rejected with a required error (primitive fields)
    pub fn not_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn minimum(mut self, min: Decimal) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: Decimal) -> Self {
        self.maximum = Some(max);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn transform(mut self, transform: fn(Value) -> Value) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Multi-field unique group declared on the entity (table level).
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    pub fields: Vec<&'static str>,
}

/// Complete metadata for one entity type: fields, uniqueness rules and the
/// business validators that run after the schema-derived ones.
pub struct EntityDescriptor {
    pub name: &'static str,
    pub table_name: &'static str,
    pub fields: Vec<FieldDescriptor>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub validators: Vec<Arc<dyn Validator>>,
    /// Initial `active` flag for freshly created records
    pub active_default: bool,
    /// Suppress unique violation errors on reference members of a group
    pub ignore_reference_unique_errors: bool,
}

impl EntityDescriptor {
    pub fn new(name: &'static str, table_name: &'static str) -> Self {
        Self {
            name,
            table_name,
            fields: Vec::new(),
            unique_constraints: Vec::new(),
            validators: Vec::new(),
            active_default: true,
            ignore_reference_unique_errors: false,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_group(mut self, fields: &[&'static str]) -> Self {
        self.unique_constraints.push(UniqueConstraint { fields: fields.to_vec() });
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn active_default(mut self, active: bool) -> Self {
        self.active_default = active;
        self
    }

    pub fn ignore_reference_unique_errors(mut self) -> Self {
        self.ignore_reference_unique_errors = true;
        self
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind.is_reference())
    }

    /// All unique groups: field-level `unique` flags become single-member
    /// groups, entity-level constraints keep their declared members.
    /// Unknown member names are skipped.
    pub fn unique_groups(&self) -> Vec<Vec<&FieldDescriptor>> {
        let mut groups: Vec<Vec<&FieldDescriptor>> = Vec::new();

        for field in self.fields.iter().filter(|f| f.unique) {
            groups.push(vec![field]);
        }

        for constraint in &self.unique_constraints {
            let members: Vec<&FieldDescriptor> =
                constraint.fields.iter().filter_map(|name| self.field_named(name)).collect();
            if members.len() == constraint.fields.len() {
                groups.push(members);
            } else {
                tracing::warn!(
                    entity = self.name,
                    "unique constraint references unknown fields: {:?}",
                    constraint.fields
                );
            }
        }

        groups
    }

    /// String columns usable for free-text search (hidden fields excluded).
    pub fn searchable_columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::String) && !f.hidden)
            .map(|f| f.name)
            .collect()
    }

    pub fn hidden_fields(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.hidden).map(|f| f.name).collect()
    }

    /// Cast for any column of this entity, base columns included.
    pub fn column_cast(&self, name: &str) -> &'static str {
        match name {
            "id" => "uuid",
            "version" => "int8",
            "active" | "deleted" => "boolean",
            "created_at" | "updated_at" => "timestamptz",
            "created_by" | "updated_by" => "text",
            other => self.field_named(other).map(|f| f.kind.sql_cast()).unwrap_or("text"),
        }
    }
}

impl std::fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("fields", &self.fields.len())
            .field("unique_constraints", &self.unique_constraints)
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_level_unique_becomes_single_member_group() {
        let descriptor = EntityDescriptor::new("things", "things")
            .field(FieldDescriptor::string("name").unique())
            .field(FieldDescriptor::string("code"));

        let groups = descriptor.unique_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].name, "name");
    }

    #[test]
    fn entity_level_constraint_resolves_members() {
        let descriptor = EntityDescriptor::new("things", "things")
            .field(FieldDescriptor::string("code"))
            .field(FieldDescriptor::reference("owner", "users"))
            .unique_group(&["code", "owner"]);

        let groups = descriptor.unique_groups();
        assert_eq!(groups.len(), 1);
        let names: Vec<_> = groups[0].iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["code", "owner"]);
    }

    #[test]
    fn constraint_with_unknown_member_is_skipped() {
        let descriptor = EntityDescriptor::new("things", "things")
            .field(FieldDescriptor::string("code"))
            .unique_group(&["code", "nope"]);

        assert!(descriptor.unique_groups().is_empty());
    }

    #[test]
    fn column_cast_covers_base_and_declared_columns() {
        let descriptor = EntityDescriptor::new("things", "things")
            .field(FieldDescriptor::datetime("due_at"))
            .field(FieldDescriptor::reference("owner", "users"));

        assert_eq!(descriptor.column_cast("id"), "uuid");
        assert_eq!(descriptor.column_cast("version"), "int8");
        assert_eq!(descriptor.column_cast("due_at"), "timestamp");
        assert_eq!(descriptor.column_cast("owner"), "uuid");
    }
}
