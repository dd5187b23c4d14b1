pub mod descriptor;
pub mod registry;

pub use descriptor::{EntityDescriptor, FieldDescriptor, FieldKind, UniqueConstraint};
pub use registry::{registry, EntityRegistry};

/// Columns shared by every entity table. Managed by the engine, never
/// writable through API payloads.
pub const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "version",
    "deleted",
    "created_at",
    "updated_at",
    "created_by",
    "updated_by",
];

pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}
