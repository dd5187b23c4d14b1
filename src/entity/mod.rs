pub mod diff;
pub mod record;

pub use diff::{calculate_changes, ChangeType, EntityDiff, FieldChange, RecordChanges};
pub use record::EntityRecord;
