//! Goal-state convergence engine.
//!
//! The engine drives registered [`Entity`] values toward their declared goal
//! state. Each entity is evaluated at a deadline: the engine reads the
//! entity's observed and goal state, asks it for an action list, and runs the
//! actions in order with bounded concurrency. A failed list is retried with
//! exponential backoff; a successful or empty list resets the backoff and
//! leaves re-evaluation to the actions themselves.
//!
//! # Guarantees
//!
//! - At most one action list runs at a time for a given entity.
//! - Different entities run in parallel, bounded by the worker pool size.
//! - `enqueue` is idempotent and always keeps the earliest requested deadline.
//! - A failing entity stays registered and scheduled, with its backoff capped
//!   at the configured ceiling, until it is deleted.

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;

pub use config::EngineConfig;
pub use engine::Engine;
pub use entity::{Action, ActionContext, ActionError, ActionFuture, ActionPlan, Entity};
pub use error::{EngineError, Result};
