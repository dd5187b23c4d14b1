use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;

use crate::auth;
use crate::schema::descriptor::{EntityDescriptor, FieldDescriptor};
use crate::validation::email::EmailListValidator;

/// Process-wide registry of entity descriptors. Every generic code path
/// (mapper, reference resolver, validator, repository, handlers) consults
/// this instead of reflecting over concrete types.
pub struct EntityRegistry {
    entities: Vec<EntityDescriptor>,
}

impl EntityRegistry {
    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entities.iter().map(|e| e.name).collect()
    }

    fn with_builtin_entities() -> Self {
        Self { entities: vec![users_descriptor(), laboratories_descriptor()] }
    }
}

fn users_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("users", "users")
        .active_default(false)
        .field(FieldDescriptor::string("username").required().max_length(20))
        .field(
            FieldDescriptor::string("password")
                .required()
                .max_length(120)
                .hidden()
                .transform(auth::digest_password_value),
        )
        .field(FieldDescriptor::string("firstname").max_length(64))
        .field(FieldDescriptor::string("lastname").max_length(64))
        .field(FieldDescriptor::string("email").max_length(1024))
        .field(
            FieldDescriptor::string("language")
                .required()
                .max_length(5)
                .default_value(Value::String("en-US".to_string())),
        )
        .unique_group(&["username"])
        .validator(Arc::new(EmailListValidator::new("email")))
}

fn laboratories_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("laboratories", "laboratories")
        .field(FieldDescriptor::string("name").required().max_length(64).unique())
        .field(FieldDescriptor::string("short_name").max_length(10))
        .field(
            FieldDescriptor::float("result_value")
                .not_nullable()
                .default_value(Value::from(0.0)),
        )
        .field(FieldDescriptor::reference("lab_user", "users"))
        .field(FieldDescriptor::datetime("lab_date"))
        .field(
            FieldDescriptor::boolean("lab_switch_on")
                .not_nullable()
                .default_value(Value::Bool(false)),
        )
        .field(
            FieldDescriptor::boolean("lab_switch_off")
                .not_nullable()
                .default_value(Value::Bool(false)),
        )
        .field(FieldDescriptor::string("email").max_length(1024))
        .validator(Arc::new(EmailListValidator::new("email")))
}

static REGISTRY: Lazy<EntityRegistry> = Lazy::new(EntityRegistry::with_builtin_entities);

pub fn registry() -> &'static EntityRegistry {
    &REGISTRY
}
