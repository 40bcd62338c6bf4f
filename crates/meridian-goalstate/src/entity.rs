//! Entities and the action lists that converge them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Error produced by an action. Actions surface whatever leaf error they hit;
/// the engine only distinguishes failure from success.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by an action invocation.
pub type ActionFuture = Pin<Box<dyn Future<Output = std::result::Result<(), ActionError>> + Send>>;

/// An object the engine drives toward a goal state.
///
/// Implementations own their state; the engine treats the observed and goal
/// snapshots as opaque values and only feeds them back to
/// [`Entity::action_list`].
pub trait Entity: Send + Sync {
    /// Unique identifier of the entity.
    fn id(&self) -> &str;

    /// Snapshot of the currently observed state.
    fn state(&self) -> Value;

    /// Snapshot of the declared goal state.
    fn goal_state(&self) -> Value;

    /// Computes the ordered actions that move `state` toward `goal_state`.
    ///
    /// An empty plan means there is nothing to do right now; the engine
    /// resets the entity's backoff and does not reschedule it.
    fn action_list(&self, state: Value, goal_state: Value) -> ActionPlan;
}

/// Cancellation handle passed to every action invocation.
///
/// The token fires when the engine stops or when the plan's own timeout
/// elapses. Actions performing external I/O should treat cancellation as a
/// graceful exit.
#[derive(Debug, Clone)]
pub struct ActionContext {
    token: CancellationToken,
}

impl ActionContext {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// The cancellation token for this run.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

type ActionFn = dyn Fn(ActionContext, Arc<dyn Entity>) -> ActionFuture + Send + Sync;

/// A first-class action value: a function from `(context, entity)` to an
/// async result. Actions are cheap to clone and carry no identity beyond the
/// function they wrap.
#[derive(Clone)]
pub struct Action {
    f: Arc<ActionFn>,
}

impl Action {
    /// Wraps a function as an action.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ActionContext, Arc<dyn Entity>) -> ActionFuture + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Invokes the action.
    pub async fn run(
        &self,
        ctx: ActionContext,
        entity: Arc<dyn Entity>,
    ) -> std::result::Result<(), ActionError> {
        (self.f)(ctx, entity).await
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").finish_non_exhaustive()
    }
}

/// An ordered list of actions, optionally bounded by a run timeout.
#[derive(Debug, Clone, Default)]
pub struct ActionPlan {
    /// Actions executed in order; the first failure aborts the run.
    pub actions: Vec<Action>,
    /// Upper bound on the whole run. Expiry cancels the run's context and
    /// counts as a retryable failure.
    pub timeout: Option<Duration>,
}

impl ActionPlan {
    /// Creates a plan from a list of actions.
    #[must_use]
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            timeout: None,
        }
    }

    /// Creates an empty plan: nothing to converge right now.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attaches a run timeout to the plan.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns true if the plan carries no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
