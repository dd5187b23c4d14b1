use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::diff::{calculate_changes, RecordChanges};
use crate::schema::EntityDescriptor;

/// A dynamic record representing one row of any registered entity.
///
/// Keeps the state the record was loaded with (`original`, absent for new
/// records) next to the current field values, so a diff is available at any
/// point of the update flow.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    entity: &'static str,
    original: Option<Map<String, Value>>,
    fields: Map<String, Value>,
}

impl EntityRecord {
    /// New record for a create operation
    pub fn new(entity: &'static str) -> Self {
        Self { entity, original: None, fields: Map::new() }
    }

    /// Record loaded from a database row
    pub fn from_row(entity: &'static str, row: Map<String, Value>) -> Self {
        Self { entity, original: Some(row.clone()), fields: row }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<Uuid> {
        self.get("id").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn version(&self) -> Option<i64> {
        self.get("version").and_then(|v| v.as_i64())
    }

    /// Version the record was loaded with, used as the optimistic lock guard
    pub fn original_version(&self) -> Option<i64> {
        self.original.as_ref()?.get("version")?.as_i64()
    }

    pub fn original(&self) -> Option<&Map<String, Value>> {
        self.original.as_ref()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    /// Check whether a specific field differs from the loaded state
    pub fn changed(&self, key: &str) -> bool {
        match &self.original {
            Some(original) => original.get(key) != self.fields.get(key),
            None => self.fields.contains_key(key),
        }
    }

    pub fn changes(&self) -> RecordChanges {
        calculate_changes(self.original.as_ref(), &self.fields)
    }

    /// API projection of the record: every field except the ones the
    /// descriptor hides.
    pub fn to_api_output(&self, descriptor: &EntityDescriptor) -> Value {
        let mut output = self.fields.clone();
        for hidden in descriptor.hidden_fields() {
            output.remove(hidden);
        }
        Value::Object(output)
    }
}

impl std::fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EntityRecord({}: {}, fields: {})",
            self.entity,
            self.id().map(|id| id.to_string()).unwrap_or_else(|| "new".to_string()),
            self.fields.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use serde_json::json;

    fn map(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        m
    }

    #[test]
    fn new_record_reports_every_field_as_change() {
        let mut record = EntityRecord::new("users");
        record.set("username", "alice").set("language", "en-US");
        assert!(record.is_new());
        assert!(record.changed("username"));
        assert_eq!(record.changes().added.len(), 2);
    }

    #[test]
    fn loaded_record_tracks_changes_against_row() {
        let row = map(vec![
            ("id", json!("11111111-1111-1111-1111-111111111111")),
            ("version", json!(3)),
            ("username", json!("alice")),
        ]);
        let mut record = EntityRecord::from_row("users", row);
        assert!(!record.changed("username"));

        record.set("username", "alice-b");
        assert!(record.changed("username"));
        assert_eq!(record.original_version(), Some(3));

        let changes = record.changes();
        assert!(changes.modified.contains_key("username"));
        assert!(changes.added.is_empty());
    }

    #[test]
    fn setting_null_is_a_change() {
        let row = map(vec![("nickname", json!("Al"))]);
        let mut record = EntityRecord::from_row("users", row);
        record.set("nickname", Value::Null);
        assert!(record.changed("nickname"));
    }

    #[test]
    fn api_output_drops_hidden_fields() {
        let descriptor = crate::schema::EntityDescriptor::new("users", "users")
            .field(FieldDescriptor::string("username"))
            .field(FieldDescriptor::string("password").hidden());

        let row = map(vec![("username", json!("alice")), ("password", json!("sha256$x$y"))]);
        let record = EntityRecord::from_row("users", row);
        let output = record.to_api_output(&descriptor);

        assert_eq!(output["username"], json!("alice"));
        assert!(output.get("password").is_none());
    }

    #[test]
    fn id_parses_uuid_string() {
        let row = map(vec![("id", json!("22222222-2222-2222-2222-222222222222"))]);
        let record = EntityRecord::from_row("users", row);
        assert_eq!(
            record.id(),
            Some(Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap())
        );
    }
}
