use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::entity::EntityRecord;
use crate::schema::{is_system_field, EntityDescriptor, FieldKind};
use crate::validation::{codes, ValidationErrors};

/// Maps all simple fields of a property-bag payload onto the record.
///
/// Reference fields are left to the resolver; nested, unknown and system
/// properties are ignored. Empty strings mean null. Type mismatches and
/// explicit nulls on non-nullable fields are collected as field errors so
/// the caller can report every bad field at once.
pub fn map_simple_fields(
    payload: &Map<String, Value>,
    descriptor: &EntityDescriptor,
    record: &mut EntityRecord,
    errors: &mut ValidationErrors,
) {
    for (property, value) in payload {
        if property.contains('.') {
            tracing::trace!(property, "ignoring nested property");
            continue;
        }
        if is_system_field(property) {
            tracing::trace!(property, "ignoring system field in payload");
            continue;
        }

        // the activity flag is a base column but an ordinary patch target
        if property == "active" {
            apply_value(record, "active", &FieldKind::Boolean, false, None, value, errors);
            continue;
        }

        let field = match descriptor.field_named(property) {
            Some(field) => field,
            None => {
                tracing::trace!(property, entity = descriptor.name, "ignoring unknown property");
                continue;
            }
        };

        if field.kind.is_reference() {
            continue;
        }

        apply_value(record, field.name, &field.kind, field.nullable, field.transform, value, errors);
    }
}

fn apply_value(
    record: &mut EntityRecord,
    name: &str,
    kind: &FieldKind,
    nullable: bool,
    transform: Option<fn(Value) -> Value>,
    value: &Value,
    errors: &mut ValidationErrors,
) {
    // empty strings mean null
    let treat_as_null =
        value.is_null() || matches!(value, Value::String(s) if s.is_empty());

    if treat_as_null {
        if nullable {
            record.set(name, Value::Null);
        } else {
            errors.add_field_error(name, codes::REQUIRED);
        }
        return;
    }

    match coerce_value(kind, value) {
        Ok(mut coerced) => {
            if let Some(transform) = transform {
                coerced = transform(coerced);
            }
            record.set(name, coerced);
        }
        Err(()) => errors.add_field_error(name, codes::INVALID_VALUE),
    }
}

/// Coerces a JSON payload value into the canonical stored form for the
/// field kind. Dates and datetimes normalize to ISO strings, UUIDs to
/// hyphenated lowercase, semicolon separated lists to arrays.
pub(crate) fn coerce_value(kind: &FieldKind, value: &Value) -> Result<Value, ()> {
    match kind {
        FieldKind::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(()),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => {
                if n.as_i64().is_some() {
                    Ok(value.clone())
                } else {
                    n.as_f64().filter(|f| f.fract() == 0.0).map(|f| Value::from(f as i64)).ok_or(())
                }
            }
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| ()),
            _ => Err(()),
        },
        FieldKind::Float => match value {
            Value::Number(n) => n.as_f64().map(Value::from).ok_or(()),
            Value::String(s) => s.trim().parse::<f64>().map(Value::from).map_err(|_| ()),
            _ => Err(()),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(()),
            },
            _ => Err(()),
        },
        FieldKind::Date => value
            .as_str()
            .and_then(|s| s.trim().parse::<NaiveDate>().ok())
            .map(|d| Value::String(d.to_string()))
            .ok_or(()),
        FieldKind::DateTime => value
            .as_str()
            .and_then(|s| s.trim().parse::<NaiveDateTime>().ok())
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .ok_or(()),
        FieldKind::Url => value
            .as_str()
            .and_then(|s| Url::parse(s.trim()).ok())
            .map(|u| Value::String(u.to_string()))
            .ok_or(()),
        FieldKind::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|u| Value::String(u.to_string()))
            .ok_or(()),
        FieldKind::Enum(values) => match value {
            Value::String(s) if values.contains(&s.as_str()) => Ok(value.clone()),
            _ => Err(()),
        },
        FieldKind::StringList => match value {
            Value::String(s) => {
                Ok(Value::Array(parse_semicolon_list(s).into_iter().map(Value::String).collect()))
            }
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Value::String(s) if !s.is_empty() => out.push(Value::String(s.clone())),
                        Value::String(_) => {} // empty segments are dropped
                        _ => return Err(()),
                    }
                }
                Ok(Value::Array(out))
            }
            _ => Err(()),
        },
        // single references resolve through the reference resolver
        FieldKind::Reference(_) => Err(()),
    }
}

/// Splits a semicolon separated string, dropping empty segments.
pub(crate) fn parse_semicolon_list(value: &str) -> Vec<String> {
    value.split(';').filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use serde_json::json;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("things", "things")
            .field(FieldDescriptor::string("name"))
            .field(FieldDescriptor::float("score").not_nullable())
            .field(FieldDescriptor::datetime("due_at"))
            .field(FieldDescriptor::date("day"))
            .field(FieldDescriptor::url("homepage"))
            .field(FieldDescriptor::enumeration("state", vec!["open", "closed"]))
            .field(FieldDescriptor::string_list("tags"))
            .field(FieldDescriptor::reference("owner", "users"))
    }

    fn run(payload: Value) -> (EntityRecord, ValidationErrors) {
        let descriptor = descriptor();
        let mut record = EntityRecord::new("things");
        let mut errors = ValidationErrors::new();
        let payload = match payload {
            Value::Object(map) => map,
            _ => panic!("payload must be object"),
        };
        map_simple_fields(&payload, &descriptor, &mut record, &mut errors);
        (record, errors)
    }

    #[test]
    fn maps_and_normalizes_typed_fields() {
        let (record, errors) = run(json!({
            "name": "thing one",
            "score": "2.5",
            "due_at": "2024-06-01T08:30:00",
            "day": "2024-06-01",
            "homepage": "https://example.com/x",
            "state": "open",
            "tags": "a;b;;c"
        }));

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(record.get("name"), Some(&json!("thing one")));
        assert_eq!(record.get("score"), Some(&json!(2.5)));
        assert_eq!(record.get("due_at"), Some(&json!("2024-06-01T08:30:00")));
        assert_eq!(record.get("day"), Some(&json!("2024-06-01")));
        assert_eq!(record.get("homepage"), Some(&json!("https://example.com/x")));
        assert_eq!(record.get("tags"), Some(&json!(["a", "b", "c"])));
    }

    #[test]
    fn empty_string_means_null() {
        let (record, errors) = run(json!({"name": ""}));
        assert!(errors.is_empty());
        assert_eq!(record.get("name"), Some(&Value::Null));
    }

    #[test]
    fn explicit_null_on_non_nullable_field_is_required_error() {
        let (record, errors) = run(json!({"score": null}));
        assert_eq!(errors.fields["score"][0].code, codes::REQUIRED);
        assert!(record.get("score").is_none());
    }

    #[test]
    fn type_mismatches_collect_invalid_value_errors() {
        let (_, errors) = run(json!({
            "score": "not-a-number",
            "due_at": "06/01/2024",
            "homepage": "not a url",
            "state": "unknown-state"
        }));

        for field in ["score", "due_at", "homepage", "state"] {
            assert_eq!(errors.fields[field][0].code, codes::INVALID_VALUE, "field {}", field);
        }
    }

    #[test]
    fn unknown_nested_and_system_properties_are_ignored() {
        let (record, errors) = run(json!({
            "nope": "x",
            "owner.name": "y",
            "id": "11111111-1111-1111-1111-111111111111",
            "version": 99
        }));

        assert!(errors.is_empty());
        assert!(record.get("nope").is_none());
        assert!(record.get("id").is_none());
        assert!(record.get("version").is_none());
    }

    #[test]
    fn reference_fields_are_left_to_the_resolver() {
        let (record, errors) = run(json!({"owner": "11111111-1111-1111-1111-111111111111"}));
        assert!(errors.is_empty());
        assert!(record.get("owner").is_none());
    }

    #[test]
    fn active_flag_is_patchable() {
        let (record, errors) = run(json!({"active": true}));
        assert!(errors.is_empty());
        assert_eq!(record.get("active"), Some(&json!(true)));

        let (_, errors) = run(json!({"active": null}));
        assert_eq!(errors.fields["active"][0].code, codes::REQUIRED);
    }

    #[test]
    fn coercion_accepts_common_lenient_forms() {
        assert_eq!(coerce_value(&FieldKind::String, &json!(42)).unwrap(), json!("42"));
        assert_eq!(coerce_value(&FieldKind::Integer, &json!("7")).unwrap(), json!(7));
        assert_eq!(coerce_value(&FieldKind::Integer, &json!(7.0)).unwrap(), json!(7));
        assert_eq!(coerce_value(&FieldKind::Boolean, &json!("true")).unwrap(), json!(true));
        assert!(coerce_value(&FieldKind::Integer, &json!(7.5)).is_err());
        assert!(coerce_value(&FieldKind::Boolean, &json!(1)).is_err());
    }

    #[test]
    fn uuid_values_normalize_to_lowercase() {
        let coerced = coerce_value(
            &FieldKind::Uuid,
            &json!("11111111-1111-1111-1111-11111111111A"),
        )
        .unwrap();
        assert_eq!(coerced, json!("11111111-1111-1111-1111-11111111111a"));
    }

    #[test]
    fn string_list_accepts_arrays_and_rejects_mixed_types() {
        assert_eq!(
            coerce_value(&FieldKind::StringList, &json!(["a", "", "b"])).unwrap(),
            json!(["a", "b"])
        );
        assert!(coerce_value(&FieldKind::StringList, &json!(["a", 1])).is_err());
    }
}
