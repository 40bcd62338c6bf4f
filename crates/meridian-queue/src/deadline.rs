//! Deadline queue: a min-heap of ids keyed by due time, with async pop.
//!
//! [`DeadlineQueue::schedule`] inserts an id or repositions it in place when
//! it is already resident, so callers can tighten or relax a deadline without
//! a cancel/re-insert pair. [`DeadlineQueue::wait_and_pop`] sleeps until the
//! earliest deadline passes; it wakes early when a new earlier deadline is
//! scheduled and unblocks when the supplied cancellation token fires.

use std::collections::HashMap;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// An id that became due, together with the deadline it was scheduled at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineItem {
    /// Identifier supplied at scheduling time.
    pub id: String,
    /// The deadline the item was popped for.
    pub deadline: Instant,
}

struct HeapEntry {
    id: String,
    deadline: Instant,
    // Insertion sequence; makes pop order deterministic for equal deadlines.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    heap: Vec<HeapEntry>,
    // id -> current heap position. Absence means not resident.
    index: HashMap<String, usize>,
    next_seq: u64,
}

impl Inner {
    fn less(&self, a: usize, b: usize) -> bool {
        let (ea, eb) = (&self.heap[a], &self.heap[b]);
        (ea.deadline, ea.seq) < (eb.deadline, eb.seq)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].id.clone(), a);
        self.index.insert(self.heap[b].id.clone(), b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    fn push(&mut self, id: String, deadline: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let pos = self.heap.len();
        self.heap.push(HeapEntry {
            id: id.clone(),
            deadline,
            seq,
        });
        self.index.insert(id, pos);
        self.sift_up(pos);
    }

    fn reposition(&mut self, pos: usize, deadline: Instant) {
        let id = self.heap[pos].id.clone();
        self.heap[pos].deadline = deadline;
        self.sift_up(pos);
        // sift_up may have moved the entry; fix downward from wherever it is.
        let pos = self.index[&id];
        self.sift_down(pos);
    }

    fn remove_at(&mut self, pos: usize) -> HeapEntry {
        let last = self.heap.len() - 1;
        self.heap.swap(pos, last);
        let entry = self.heap.pop().expect("heap entry present");
        self.index.remove(&entry.id);
        if pos < self.heap.len() {
            self.index.insert(self.heap[pos].id.clone(), pos);
            self.sift_down(pos);
            self.sift_up(pos);
        }
        entry
    }
}

/// Min-heap of `(deadline, id)` pairs shared across tasks.
pub struct DeadlineQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for DeadlineQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadlineQueue {
    /// Creates an empty deadline queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Schedules `id` at `deadline`, repositioning it if already resident.
    ///
    /// The new deadline wins whether it is earlier or later; policy such as
    /// keep-the-earlier belongs to the caller.
    pub fn schedule(&self, id: &str, deadline: Instant) {
        {
            let mut inner = self.inner.lock();
            match inner.index.get(id).copied() {
                Some(pos) => inner.reposition(pos, deadline),
                None => inner.push(id.to_owned(), deadline),
            }
            gauge!("meridian.queue.deadline.length").set(inner.heap.len() as f64);
        }
        trace!(id, "deadline scheduled");
        // Wake the waiter in case the new deadline is now the earliest.
        self.notify.notify_one();
    }

    /// Removes `id` from the queue if present. Returns whether it was resident.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.index.get(id).copied() {
                Some(pos) => {
                    inner.remove_at(pos);
                    gauge!("meridian.queue.deadline.length").set(inner.heap.len() as f64);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.notify.notify_one();
        }
        removed
    }

    /// Returns true if `id` is currently resident in the heap.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().index.contains_key(id)
    }

    /// Returns the deadline `id` is currently scheduled at, if resident.
    #[must_use]
    pub fn deadline_of(&self, id: &str) -> Option<Instant> {
        let inner = self.inner.lock();
        inner.index.get(id).map(|&pos| inner.heap[pos].deadline)
    }

    /// Returns the earliest scheduled deadline, if any.
    #[must_use]
    pub fn peek(&self) -> Option<Instant> {
        self.inner.lock().heap.first().map(|e| e.deadline)
    }

    /// Returns the number of resident items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Returns true if no items are scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until the earliest deadline has passed, then pops and returns
    /// that item. Returns `None` once `stop` is cancelled.
    ///
    /// Among due items, pop order follows ascending deadline with insertion
    /// order breaking ties.
    pub async fn wait_and_pop(&self, stop: &CancellationToken) -> Option<DeadlineItem> {
        loop {
            // Register for wake-ups before inspecting the heap so a schedule
            // between the check and the await is not lost.
            let notified = self.notify.notified();

            let next_deadline = {
                let mut inner = self.inner.lock();
                match inner.heap.first().map(|e| e.deadline) {
                    Some(deadline) if deadline <= Instant::now() => {
                        let entry = inner.remove_at(0);
                        gauge!("meridian.queue.deadline.length").set(inner.heap.len() as f64);
                        return Some(DeadlineItem {
                            id: entry.id,
                            deadline: entry.deadline,
                        });
                    }
                    other => other,
                }
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = stop.cancelled() => return None,
                        _ = notified => {}
                        () = sleep_until(deadline) => {}
                    }
                }
                None => {
                    tokio::select! {
                        () = stop.cancelled() => return None,
                        _ = notified => {}
                    }
                }
            }
        }
    }
}
