//! Capacity-limited priority queue over the multi-level list.

use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{QueueError, Result};
use crate::multilevel::MultiLevelList;

/// A unit of work queued at a priority.
///
/// The payload is opaque to the queue; `enqueue_time` records when the item
/// entered so consumers can measure queueing delay.
#[derive(Debug, Clone)]
pub struct TaskItem {
    /// Scheduling priority; higher values dequeue first.
    pub priority: u32,
    /// When the item was enqueued.
    pub enqueue_time: Instant,
    /// Opaque payload carried through the queue.
    pub payload: Value,
}

impl TaskItem {
    /// Creates a task item stamped with the current time.
    #[must_use]
    pub fn new(priority: u32, payload: Value) -> Self {
        Self {
            priority,
            enqueue_time: Instant::now(),
            payload,
        }
    }
}

struct Inner {
    list: MultiLevelList<TaskItem>,
    count: usize,
}

/// FIFO queue that dequeues the highest-priority item entered first.
///
/// The queue holds its mutex across every operation, so `count` always equals
/// the sum of the level lengths at any observable moment.
pub struct PriorityQueue {
    limit: usize,
    inner: Mutex<Inner>,
}

impl PriorityQueue {
    /// Creates a queue that holds at most `limit` items.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            inner: Mutex::new(Inner {
                list: MultiLevelList::new(),
                count: 0,
            }),
        }
    }

    /// Queues the item at its priority level.
    pub fn enqueue(&self, item: TaskItem) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.count >= self.limit {
            return Err(QueueError::LimitReached(self.limit));
        }
        inner.list.push(item.priority, item);
        inner.count += 1;
        Ok(())
    }

    /// Dequeues the oldest item from the highest non-empty priority level.
    ///
    /// Retries the pop if the peeked level drains before it lands, until
    /// either an item is obtained or the whole queue reports empty.
    pub fn dequeue(&self) -> Result<TaskItem> {
        let mut inner = self.inner.lock();
        loop {
            let highest = inner.list.highest_level().ok_or(QueueError::Empty)?;
            match inner.list.pop(highest) {
                Ok(item) => {
                    inner.count -= 1;
                    return Ok(item);
                }
                // The level emptied between peek and pop; re-peek.
                Err(QueueError::Empty) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Returns the number of items queued at the given priority.
    #[must_use]
    pub fn len(&self, priority: u32) -> usize {
        self.inner.lock().list.len(priority)
    }

    /// Returns the total number of queued items.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().count
    }

    /// Returns true if the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}
