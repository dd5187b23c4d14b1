use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Information about a specific field change
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// Detailed change information for a record
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub added: BTreeMap<String, FieldChange>,
    pub modified: BTreeMap<String, FieldChange>,
    pub removed: Vec<FieldChange>,
}

impl RecordChanges {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.removed.is_empty()
    }

    pub fn changed_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.added.keys().chain(self.modified.keys()).cloned().collect();
        names.sort();
        names
    }
}

/// Calculate the field-level diff between an original state and the current
/// state (top-level keys only). With no original state every field is added.
pub fn calculate_changes(
    original: Option<&Map<String, Value>>,
    current: &Map<String, Value>,
) -> RecordChanges {
    let mut changes = RecordChanges::default();

    match original {
        Some(original) => {
            for (key, new_value) in current {
                match original.get(key) {
                    Some(old_value) if old_value != new_value => {
                        changes.modified.insert(
                            key.clone(),
                            FieldChange {
                                field: key.clone(),
                                old_value: Some(old_value.clone()),
                                new_value: Some(new_value.clone()),
                                change_type: ChangeType::Modified,
                            },
                        );
                    }
                    None => {
                        changes.added.insert(
                            key.clone(),
                            FieldChange {
                                field: key.clone(),
                                old_value: None,
                                new_value: Some(new_value.clone()),
                                change_type: ChangeType::Added,
                            },
                        );
                    }
                    _ => {}
                }
            }

            for (key, old_value) in original {
                if !current.contains_key(key) {
                    changes.removed.push(FieldChange {
                        field: key.clone(),
                        old_value: Some(old_value.clone()),
                        new_value: None,
                        change_type: ChangeType::Removed,
                    });
                }
            }
        }
        None => {
            for (key, value) in current {
                changes.added.insert(
                    key.clone(),
                    FieldChange {
                        field: key.clone(),
                        old_value: None,
                        new_value: Some(value.clone()),
                        change_type: ChangeType::Added,
                    },
                );
            }
        }
    }

    changes
}

/// State transition of one entity: previous state (absent on create),
/// resulting state, and the raw request payload that caused it. Handed to
/// validators and to change hooks after commit.
#[derive(Debug, Clone)]
pub struct EntityDiff {
    pub entity: String,
    pub previous: Option<Map<String, Value>>,
    pub current: Map<String, Value>,
    pub payload: Map<String, Value>,
}

impl EntityDiff {
    pub fn new(
        entity: impl Into<String>,
        previous: Option<Map<String, Value>>,
        current: Map<String, Value>,
        payload: Map<String, Value>,
    ) -> Self {
        Self { entity: entity.into(), previous, current, payload }
    }

    pub fn is_create(&self) -> bool {
        self.previous.is_none()
    }

    pub fn changes(&self) -> RecordChanges {
        calculate_changes(self.previous.as_ref(), &self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        m
    }

    #[test]
    fn create_diff_marks_everything_added() {
        let current = map(vec![("name", json!("Alice")), ("age", json!(30))]);
        let changes = calculate_changes(None, &current);
        assert!(changes.has_changes());
        assert_eq!(changes.added.len(), 2);
        assert!(changes.modified.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn update_diff_detects_modified_and_removed() {
        let original = map(vec![("name", json!("Alice")), ("nickname", json!("Al"))]);
        let current = map(vec![("name", json!("Alice B"))]);
        let changes = calculate_changes(Some(&original), &current);

        let change = changes.modified.get("name").unwrap();
        assert_eq!(change.old_value, Some(json!("Alice")));
        assert_eq!(change.new_value, Some(json!("Alice B")));
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0].field, "nickname");
    }

    #[test]
    fn unchanged_fields_do_not_appear() {
        let original = map(vec![("name", json!("Alice"))]);
        let current = original.clone();
        let changes = calculate_changes(Some(&original), &current);
        assert!(!changes.has_changes());
    }

    #[test]
    fn diff_reports_create() {
        let current = map(vec![("name", json!("Lab"))]);
        let diff = EntityDiff::new("laboratories", None, current, Map::new());
        assert!(diff.is_create());
        assert_eq!(diff.changes().added.len(), 1);
    }
}
