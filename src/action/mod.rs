//! Action framework
//!
//! Mutating operations (start, stop, delete, ...) are declared per
//! (service, resource kind) as a list of [`Action`] descriptors plus one
//! [`ActionExecutor`]. The flow for one invocation is:
//!
//! ```text
//! Selected -> (policy none ? Confirmed : AwaitingConfirmation)
//!          -> [confirm | cancel] -> Dispatched -> Completed(success | failure)
//! ```
//!
//! - [`pending`] - the confirmation half of that state machine
//! - [`dispatch`] - lookup, read-only guard and executor call

pub mod dispatch;
pub mod pending;

pub use dispatch::{ActionDispatcher, ActionReport, DispatchOutcome};
pub use pending::{Acknowledgement, ActionState, ConfirmPrompt, PendingAction};

use crate::dao::RequestContext;
use crate::error::DaoError;
use crate::resource::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How an action is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Upstream API call
    #[default]
    Api,
    /// Local shell command (ssh, console, ...)
    Exec,
}

/// Confirmation the presentation layer must obtain before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmPolicy {
    #[default]
    None,
    /// A single yes
    Simple,
    /// The resource name typed back
    Dangerous,
}

impl ConfirmPolicy {
    /// Map the older `needs_confirm` / `destructive` flag pair
    pub fn from_legacy(needs_confirm: bool, destructive: bool) -> Self {
        match (needs_confirm, destructive) {
            (_, true) => Self::Dangerous,
            (true, false) => Self::Simple,
            (false, false) => Self::None,
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        *self != Self::None
    }
}

/// Declarative description of one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub shortcut: char,
    #[serde(rename = "type", default)]
    pub kind: ActionKind,
    pub operation: String,
    #[serde(default)]
    pub confirm: ConfirmPolicy,
    /// Confirmation message; defaults to the action name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Action {
    pub fn new(name: &str, shortcut: char, operation: &str) -> Self {
        Self {
            name: name.to_string(),
            shortcut,
            kind: ActionKind::Api,
            operation: operation.to_string(),
            confirm: ConfirmPolicy::None,
            message: None,
        }
    }

    pub fn exec(mut self) -> Self {
        self.kind = ActionKind::Exec;
        self
    }

    pub fn confirm(mut self, policy: ConfirmPolicy) -> Self {
        self.confirm = policy;
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn confirm_message(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.name)
    }
}

/// Outcome of executing one action against one resource
#[derive(Debug)]
pub enum ActionResult {
    Success {
        message: String,
    },
    Failure {
        cause: DaoError,
        /// Which resource/operation failed, for display
        context: Option<String>,
    },
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    pub fn failure(cause: DaoError) -> Self {
        Self::Failure {
            cause,
            context: None,
        }
    }

    pub fn failure_with_context(cause: DaoError, context: impl Into<String>) -> Self {
        Self::Failure {
            cause,
            context: Some(context.into()),
        }
    }

    /// Success message or failure from a DAO-style result
    pub fn from_result(result: Result<String, DaoError>, context: impl Into<String>) -> Self {
        match result {
            Ok(message) => Self::success(message),
            Err(cause) => Self::failure_with_context(cause, context),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_unknown_operation(&self) -> bool {
        matches!(
            self,
            Self::Failure {
                cause: DaoError::UnknownOperation { .. },
                ..
            }
        )
    }

    pub fn cause(&self) -> Option<&DaoError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { cause, .. } => Some(cause),
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { message } => f.write_str(message),
            Self::Failure {
                cause,
                context: Some(context),
            } => write!(f, "{}: {}", context, cause),
            Self::Failure {
                cause,
                context: None,
            } => write!(f, "{}", cause),
        }
    }
}

/// Performs the actions registered for one (service, resource kind)
///
/// Exactly one upstream call per invocation and no retries. An operation
/// identifier without a matching case must yield
/// [`DaoError::UnknownOperation`], never a silent success.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, ctx: &RequestContext, action: &Action, resource: &dyn Resource) -> ActionResult;
}

/// Typed operation set of one resource kind
///
/// The string identifier only exists at the registration boundary; handlers
/// match on the enum.
pub trait ActionOperation: Sized + Send + Sync + fmt::Debug + 'static {
    fn parse(operation: &str) -> Option<Self>;
    fn as_str(&self) -> &'static str;
}

/// Handler over a typed operation set
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    type Op: ActionOperation;

    async fn handle(&self, ctx: &RequestContext, op: Self::Op, resource: &dyn Resource) -> ActionResult;
}

/// Adapts an [`OperationHandler`] into an [`ActionExecutor`]
pub struct Typed<H>(pub H);

#[async_trait]
impl<H: OperationHandler> ActionExecutor for Typed<H> {
    async fn execute(&self, ctx: &RequestContext, action: &Action, resource: &dyn Resource) -> ActionResult {
        match H::Op::parse(&action.operation) {
            Some(op) => {
                tracing::debug!("typed dispatch: {:?} on {}", op, resource.id());
                self.0.handle(ctx, op, resource).await
            }
            None => ActionResult::failure_with_context(
                DaoError::unknown_operation(&action.operation),
                format!("{} {}", action.name, resource.id()),
            ),
        }
    }
}

/// Actions and executor registered for one (service, resource kind)
#[derive(Clone)]
pub struct ActionSet {
    actions: Arc<[Action]>,
    executor: Arc<dyn ActionExecutor>,
}

impl ActionSet {
    pub fn new(actions: Vec<Action>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            actions: actions.into(),
            executor,
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn executor(&self) -> &Arc<dyn ActionExecutor> {
        &self.executor
    }

    pub fn find_by_shortcut(&self, shortcut: char) -> Option<&Action> {
        self.actions.iter().find(|a| a.shortcut == shortcut)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name) || a.operation == name)
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSet")
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::BaseResource;

    #[derive(Debug, PartialEq)]
    enum VmOp {
        Start,
        Stop,
    }

    impl ActionOperation for VmOp {
        fn parse(operation: &str) -> Option<Self> {
            match operation {
                "start_instance" => Some(Self::Start),
                "stop_instance" => Some(Self::Stop),
                _ => None,
            }
        }

        fn as_str(&self) -> &'static str {
            match self {
                Self::Start => "start_instance",
                Self::Stop => "stop_instance",
            }
        }
    }

    struct VmHandler;

    #[async_trait]
    impl OperationHandler for VmHandler {
        type Op = VmOp;

        async fn handle(&self, _ctx: &RequestContext, op: VmOp, resource: &dyn Resource) -> ActionResult {
            ActionResult::success(format!("{} {}", op.as_str(), resource.id()))
        }
    }

    #[test]
    fn test_action_from_json() {
        let action: Action = serde_json::from_str(
            r#"{"name": "Delete", "shortcut": "D", "operation": "delete_instance", "confirm": "dangerous"}"#,
        )
        .unwrap();
        assert_eq!(action.kind, ActionKind::Api);
        assert_eq!(action.confirm, ConfirmPolicy::Dangerous);
        assert_eq!(action.shortcut, 'D');
        assert_eq!(action.confirm_message(), "Delete");
    }

    #[test]
    fn test_builder_matches_json_descriptor() {
        let built = Action::new("SSH", 'x', "ssh")
            .exec()
            .confirm(ConfirmPolicy::Simple)
            .with_message("Open a shell on");
        let parsed: Action = serde_json::from_str(
            r#"{"name": "SSH", "shortcut": "x", "type": "exec", "operation": "ssh",
                "confirm": "simple", "message": "Open a shell on"}"#,
        )
        .unwrap();

        assert_eq!(built, parsed);
        assert_eq!(built.kind, ActionKind::Exec);
        assert_eq!(built.confirm_message(), "Open a shell on");
    }

    #[test]
    fn test_confirm_policy_from_legacy() {
        assert_eq!(ConfirmPolicy::from_legacy(false, false), ConfirmPolicy::None);
        assert_eq!(ConfirmPolicy::from_legacy(true, false), ConfirmPolicy::Simple);
        assert_eq!(ConfirmPolicy::from_legacy(true, true), ConfirmPolicy::Dangerous);
        assert!(!ConfirmPolicy::None.requires_confirmation());
    }

    #[tokio::test]
    async fn test_typed_executor_dispatches_known_operation() {
        let executor = Typed(VmHandler);
        let vm = BaseResource::new("i-1", "web");
        let result = executor
            .execute(
                &RequestContext::new(),
                &Action::new("Start", 's', "start_instance"),
                &vm,
            )
            .await;
        assert!(result.is_success());
        assert_eq!(result.to_string(), "start_instance i-1");
    }

    #[tokio::test]
    async fn test_typed_executor_reports_unknown_operation() {
        let executor = Typed(VmHandler);
        let vm = BaseResource::new("i-1", "web");
        let result = executor
            .execute(
                &RequestContext::new(),
                &Action::new("Hibernate", 'h', "hibernate_instance"),
                &vm,
            )
            .await;
        assert!(!result.is_success());
        assert!(result.is_unknown_operation());
        assert_eq!(
            result.to_string(),
            "Hibernate i-1: unknown operation: hibernate_instance"
        );
    }

    #[test]
    fn test_action_set_lookup() {
        let set = ActionSet::new(
            vec![
                Action::new("Start", 's', "start_instance"),
                Action::new("Stop", 'S', "stop_instance").confirm(ConfirmPolicy::Simple),
            ],
            Arc::new(Typed(VmHandler)),
        );
        assert_eq!(set.find_by_shortcut('S').map(|a| a.name.as_str()), Some("Stop"));
        assert_eq!(set.find_by_name("start").map(|a| a.shortcut), Some('s'));
        assert_eq!(set.find_by_name("stop_instance").map(|a| a.shortcut), Some('S'));
        assert!(set.find_by_shortcut('x').is_none());
    }
}
