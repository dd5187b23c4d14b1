pub mod email;
pub mod errors;
pub mod schema_validator;

pub use errors::{codes, ValidationError, ValidationErrors};
pub use schema_validator::SchemaValidator;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::database::manager::DatabaseError;
use crate::entity::EntityRecord;
use crate::schema::EntityDescriptor;

/// Everything a validator may look at: the merged record, the state before
/// the patch (absent on create), the raw payload and a database handle for
/// lookups such as uniqueness probes.
pub struct ValidationContext<'a> {
    pub descriptor: &'a EntityDescriptor,
    pub record: &'a EntityRecord,
    pub previous: Option<&'a Map<String, Value>>,
    pub payload: &'a Map<String, Value>,
    pub pool: &'a PgPool,
}

/// Validates one entity before it is saved. Implementations record every
/// violation they find; the engine aborts when any error was collected.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        errors: &mut ValidationErrors,
    ) -> Result<(), DatabaseError>;
}
