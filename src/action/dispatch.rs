//! Action dispatch
//!
//! Turns a confirmed [`PendingAction`] into exactly one executor call and an
//! [`ActionReport`] the host can surface.

use super::{ActionResult, ActionState, PendingAction};
use crate::dao::RequestContext;
use crate::error::DaoError;
use crate::registry::{Registry, ResourceKey};
use crate::resource::{resource_region, unwrap_all};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Record of one completed invocation
#[derive(Debug)]
pub struct ActionReport {
    pub invocation_id: Uuid,
    pub key: ResourceKey,
    pub action: String,
    pub operation: String,
    /// Id as the host saw it (region-qualified when the resource was wrapped)
    pub resource_id: String,
    pub region: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: ActionResult,
}

impl ActionReport {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    /// Wall-clock duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// One-line summary for a notification or status bar
    pub fn summary(&self) -> String {
        let status = if self.is_success() { "OK" } else { "FAILED" };
        format!("[{}] {} {}: {}", status, self.action, self.resource_id, self.result)
    }
}

/// What became of a pending action handed to the dispatcher
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(ActionReport),
    /// The user declined; nothing was executed and no result exists
    Cancelled,
    /// Confirmation is still outstanding; the action is handed back
    AwaitingConfirmation(PendingAction),
}

impl DispatchOutcome {
    pub fn report(&self) -> Option<&ActionReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Looks up executors in the registry and runs confirmed actions
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    registry: Arc<Registry>,
    readonly: bool,
}

impl ActionDispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            readonly: false,
        }
    }

    /// Refuse every action (block all write operations)
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn dispatch(&self, ctx: &RequestContext, pending: PendingAction) -> DispatchOutcome {
        match pending.state() {
            ActionState::Cancelled => {
                tracing::info!(
                    "action {} on {} cancelled by user",
                    pending.action().name,
                    pending.resource().id()
                );
                return DispatchOutcome::Cancelled;
            }
            ActionState::AwaitingConfirmation => {
                tracing::warn!(
                    "action {} on {} dispatched before confirmation",
                    pending.action().name,
                    pending.resource().id()
                );
                return DispatchOutcome::AwaitingConfirmation(pending);
            }
            ActionState::Confirmed => {}
        }

        let (invocation_id, key, action, resource) = pending.into_parts();
        let resource_id = resource.id();
        let region = resource_region(resource.as_ref()).to_string();
        let started_at = Utc::now();

        let context = format!("{} {}", action.name, resource_id);
        let result = if self.readonly {
            tracing::warn!("action {} blocked: read-only mode", context);
            ActionResult::failure_with_context(DaoError::ReadOnly, context)
        } else {
            match self.registry.action_set(&key) {
                None => ActionResult::failure_with_context(
                    DaoError::Registration(format!("no actions registered for {}", key)),
                    context,
                ),
                Some(set) if !set.actions().iter().any(|a| a.operation == action.operation) => {
                    ActionResult::failure_with_context(DaoError::unknown_operation(&action.operation), context)
                }
                Some(set) => {
                    let target = unwrap_all(resource);
                    let call_ctx = if region.is_empty() {
                        ctx.clone()
                    } else {
                        ctx.with_region(&region)
                    };
                    tracing::info!(
                        "execute_action: key={}, operation={}, resource={}, region={}",
                        key,
                        action.operation,
                        resource_id,
                        region
                    );
                    let executor = Arc::clone(set.executor());
                    let run = call_ctx
                        .run(async { Ok(executor.execute(&call_ctx, &action, target.as_ref()).await) })
                        .await;
                    match run {
                        Ok(result) => result,
                        Err(cause) => ActionResult::failure_with_context(cause, context),
                    }
                }
            }
        };

        if let ActionResult::Failure { cause, .. } = &result {
            tracing::error!("action {} on {} failed: {}", action.name, resource_id, cause);
        }

        DispatchOutcome::Completed(ActionReport {
            invocation_id,
            key,
            action: action.name,
            operation: action.operation,
            resource_id,
            region,
            started_at,
            finished_at: Utc::now(),
            result,
        })
    }
}
