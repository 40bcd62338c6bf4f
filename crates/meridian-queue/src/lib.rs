//! Priority and deadline queues for the meridian orchestrator.
//!
//! Two queue flavours live here:
//!
//! - [`PriorityQueue`]: a capacity-limited, multi-level FIFO. Items carry an
//!   integer priority; dequeue always drains the highest non-empty level,
//!   strictly in insertion order within a level.
//! - [`DeadlineQueue`]: a min-heap keyed by deadline with an async
//!   [`DeadlineQueue::wait_and_pop`] that sleeps until the earliest deadline
//!   passes and reacts to earlier reschedules and shutdown.
//!
//! Both are safe to share across tasks; each is guarded by a single internal
//! mutex and never takes another component's lock.

pub mod deadline;
pub mod error;
pub mod multilevel;
pub mod priority;

pub use deadline::{DeadlineItem, DeadlineQueue};
pub use error::{QueueError, Result};
pub use multilevel::MultiLevelList;
pub use priority::{PriorityQueue, TaskItem};
