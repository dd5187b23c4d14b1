use async_trait::async_trait;

use crate::hooks::{ChangeEvent, ChangeHook, HookError};

/// Writes a structured audit line for every committed change: who changed
/// which record and which fields.
pub struct AuditLogHook;

#[async_trait]
impl ChangeHook for AuditLogHook {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn on_change(&self, event: &ChangeEvent) -> Result<(), HookError> {
        let changes = event.diff.changes();
        tracing::info!(
            entity = %event.entity,
            id = ?event.entity_id,
            operation = ?event.operation,
            actor = %event.actor,
            changed_fields = ?changes.changed_field_names(),
            "entity change recorded"
        );
        Ok(())
    }
}
