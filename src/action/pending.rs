//! Pending actions
//!
//! An action the user picked but that has not been dispatched yet. The core
//! records which confirmation is required and whether it was given; drawing
//! the prompt is left to the host.

use super::{Action, ConfirmPolicy};
use crate::registry::ResourceKey;
use crate::resource::{unwrap_all_ref, Resource};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    AwaitingConfirmation,
    Confirmed,
    Cancelled,
}

/// What the user answered to a confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    Yes,
    No,
    /// Free text, e.g. the resource name re-typed for a dangerous action
    Typed(String),
}

/// Prompt the host should display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    pub message: String,
    pub policy: ConfirmPolicy,
    /// Text that must be typed back, for dangerous actions
    pub expected_input: Option<String>,
}

pub struct PendingAction {
    id: Uuid,
    key: ResourceKey,
    action: Action,
    resource: Box<dyn Resource>,
    state: ActionState,
}

impl PendingAction {
    /// Select `action` for `resource`. Actions without a confirmation policy
    /// are confirmed immediately.
    pub fn new(key: ResourceKey, action: Action, resource: Box<dyn Resource>) -> Self {
        let state = if action.confirm.requires_confirmation() {
            ActionState::AwaitingConfirmation
        } else {
            ActionState::Confirmed
        };
        let id = Uuid::new_v4();
        tracing::debug!(
            "action {} selected: {} on {} ({:?})",
            id,
            action.name,
            resource.id(),
            state
        );
        Self {
            id,
            key,
            action,
            resource,
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ActionState::Confirmed
    }

    /// Name the user must type for a dangerous action: the display name, or
    /// the adapter id when the resource has no name
    pub fn confirmation_text(&self) -> String {
        let inner = unwrap_all_ref(self.resource.as_ref());
        if inner.name().is_empty() {
            inner.id()
        } else {
            inner.name().to_string()
        }
    }

    /// Prompt to show, or `None` when nothing is awaited
    pub fn prompt(&self) -> Option<ConfirmPrompt> {
        if self.state != ActionState::AwaitingConfirmation {
            return None;
        }
        let target = self.confirmation_text();
        let expected_input = match self.action.confirm {
            ConfirmPolicy::Dangerous => Some(target.clone()),
            _ => None,
        };
        Some(ConfirmPrompt {
            message: format!("{} '{}'?", self.action.confirm_message(), target),
            policy: self.action.confirm,
            expected_input,
        })
    }

    /// Apply the user's answer
    ///
    /// `No` cancels. A simple policy accepts `Yes` (or typed y/yes). A
    /// dangerous policy only accepts the exact confirmation text; anything else
    /// leaves the action awaiting confirmation.
    pub fn acknowledge(&mut self, ack: Acknowledgement) -> ActionState {
        if self.state != ActionState::AwaitingConfirmation {
            return self.state;
        }

        self.state = match (self.action.confirm, ack) {
            (_, Acknowledgement::No) => ActionState::Cancelled,
            (ConfirmPolicy::Dangerous, Acknowledgement::Typed(text)) => {
                if text == self.confirmation_text() {
                    ActionState::Confirmed
                } else {
                    tracing::warn!("action {}: confirmation text mismatch", self.id);
                    ActionState::AwaitingConfirmation
                }
            }
            (ConfirmPolicy::Dangerous, Acknowledgement::Yes) => ActionState::AwaitingConfirmation,
            (_, Acknowledgement::Yes) => ActionState::Confirmed,
            (_, Acknowledgement::Typed(text)) => {
                if text.eq_ignore_ascii_case("y") || text.eq_ignore_ascii_case("yes") {
                    ActionState::Confirmed
                } else {
                    ActionState::AwaitingConfirmation
                }
            }
        };
        self.state
    }

    pub fn cancel(&mut self) {
        if self.state != ActionState::Cancelled {
            tracing::debug!("action {} cancelled", self.id);
        }
        self.state = ActionState::Cancelled;
    }

    pub(crate) fn into_parts(self) -> (Uuid, ResourceKey, Action, Box<dyn Resource>) {
        (self.id, self.key, self.action, self.resource)
    }
}

impl std::fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAction")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("action", &self.action.name)
            .field("resource", &self.resource.id())
            .field("state", &self.state)
            .finish()
    }
}
