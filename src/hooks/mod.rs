pub mod audit;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::entity::EntityDiff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Created,
    Updated,
}

/// A committed entity change, including the audit diff (previous vs.
/// current state plus the raw payload).
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub entity: String,
    pub operation: ChangeOperation,
    pub entity_id: Option<Uuid>,
    pub actor: String,
    pub diff: EntityDiff,
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(String),
}

/// Downstream consumer of committed changes. Hooks run after the
/// transaction; they can observe, never veto.
#[async_trait]
pub trait ChangeHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _entity: &str) -> bool {
        true
    }

    /// Execution timeout (default 5 seconds)
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn on_change(&self, event: &ChangeEvent) -> Result<(), HookError>;
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn ChangeHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Box<dyn ChangeHook>) {
        tracing::debug!("registered change hook '{}'", hook.name());
        self.hooks.push(hook);
    }

    /// Runs every applicable hook concurrently with timeout protection.
    /// Failures and timeouts are logged and swallowed; the request that
    /// caused the change already committed.
    pub async fn notify(&self, event: &ChangeEvent) {
        let executions = self
            .hooks
            .iter()
            .filter(|hook| hook.applies_to(&event.entity))
            .map(|hook| async move {
                match timeout(hook.timeout(), hook.on_change(event)).await {
                    Ok(Ok(())) => {
                        tracing::debug!(hook = hook.name(), "change hook completed");
                    }
                    Ok(Err(error)) => {
                        tracing::warn!(hook = hook.name(), %error, "change hook failed");
                    }
                    Err(_) => {
                        tracing::warn!(
                            hook = hook.name(),
                            timeout = ?hook.timeout(),
                            "change hook timed out"
                        );
                    }
                }
            });

        join_all(executions).await;
    }
}

static REGISTRY: Lazy<HookRegistry> = Lazy::new(|| {
    let mut registry = HookRegistry::new();
    registry.register(Box::new(audit::AuditLogHook));
    registry
});

pub fn registry() -> &'static HookRegistry {
    &REGISTRY
}
