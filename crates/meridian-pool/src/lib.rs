//! Bounded, elastic pool of asynchronous job workers.
//!
//! A [`Pool`] runs up to a maximum number of jobs concurrently. Enqueueing
//! never blocks: jobs land on an internal FIFO and run once they reach the
//! front and a worker is free. The worker count can be raised or lowered at
//! runtime; excess workers exit lazily the next time they wake.
//!
//! The pool must be created inside a Tokio runtime, since workers are spawned
//! as tasks at construction.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

/// Worker count used when [`PoolOptions::max_workers`] is zero.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Future returned by a job closure.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A unit of work: runs to completion and returns nothing.
pub type Job = Box<dyn FnOnce() -> JobFuture + Send>;

/// Options for constructing a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Target number of concurrent workers. Zero selects
    /// [`DEFAULT_MAX_WORKERS`].
    pub max_workers: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

struct WorkerCounts {
    live: usize,
    target: usize,
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    job_ready: Notify,
    counts: Mutex<WorkerCounts>,
    // Jobs accepted but not yet finished (queued + running).
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Shared {
    /// A worker above the current target decrements the live count and exits.
    fn should_worker_stop(&self) -> bool {
        let mut counts = self.counts.lock();
        if counts.live > counts.target {
            counts.live -= 1;
            true
        } else {
            false
        }
    }
}

/// Pool for running up to a maximum number of jobs concurrently.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Creates a pool and spawns its initial workers.
    #[must_use]
    pub fn new(options: PoolOptions) -> Self {
        let max_workers = if options.max_workers == 0 {
            DEFAULT_MAX_WORKERS
        } else {
            options.max_workers
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            job_ready: Notify::new(),
            counts: Mutex::new(WorkerCounts {
                live: max_workers,
                target: max_workers,
            }),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        });

        for _ in 0..max_workers {
            tokio::spawn(run_worker(Arc::clone(&shared)));
        }

        Self { shared }
    }

    /// Enqueues a job. Never blocks; the internal FIFO is unbounded.
    pub fn enqueue(&self, job: Job) {
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        {
            let mut queue = self.shared.queue.lock();
            queue.push_back(job);
            gauge!("meridian.pool.queue.depth").set(queue.len() as f64);
        }
        self.shared.job_ready.notify_one();
    }

    /// Sets the target worker count.
    ///
    /// Raising the target spawns workers immediately; lowering it lets the
    /// excess workers exit the next time they wake. Zero or less selects
    /// [`DEFAULT_MAX_WORKERS`].
    pub fn set_max_workers(&self, num: usize) {
        let num = if num == 0 { DEFAULT_MAX_WORKERS } else { num };

        let to_spawn = {
            let mut counts = self.shared.counts.lock();
            counts.target = num;
            let missing = num.saturating_sub(counts.live);
            counts.live += missing;
            missing
        };

        debug!(target = num, spawned = to_spawn, "worker target updated");
        for _ in 0..to_spawn {
            tokio::spawn(run_worker(Arc::clone(&self.shared)));
        }
    }

    /// Returns the current target worker count.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.shared.counts.lock().target
    }

    /// Returns the number of jobs accepted but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Blocks until the queue is empty and all workers are idle.
    ///
    /// Useful for per-request pools and in tests.
    pub async fn wait_until_processed(&self) {
        loop {
            let drained = self.shared.drained.notified();
            if self.shared.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }
}

async fn run_worker(shared: Arc<Shared>) {
    loop {
        if shared.should_worker_stop() {
            return;
        }

        let job = loop {
            let job_ready = shared.job_ready.notified();
            {
                let mut queue = shared.queue.lock();
                if let Some(job) = queue.pop_front() {
                    gauge!("meridian.pool.queue.depth").set(queue.len() as f64);
                    break job;
                }
            }
            job_ready.await;
            if shared.should_worker_stop() {
                // This worker consumed a wake-up; pass it on before exiting.
                shared.job_ready.notify_one();
                return;
            }
        };

        job().await;

        if shared.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            shared.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn counting_job(counter: Arc<AtomicUsize>) -> Job {
        Box::new(move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn runs_enqueued_jobs() {
        let pool = Pool::new(PoolOptions { max_workers: 2 });
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            pool.enqueue(counting_job(Arc::clone(&counter)));
        }
        pool.wait_until_processed().await;

        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn zero_max_workers_uses_default() {
        let pool = Pool::new(PoolOptions { max_workers: 0 });
        assert_eq!(pool.max_workers(), DEFAULT_MAX_WORKERS);

        pool.set_max_workers(0);
        assert_eq!(pool.max_workers(), DEFAULT_MAX_WORKERS);
    }

    #[tokio::test]
    async fn wait_until_processed_on_idle_pool_returns() {
        let pool = Pool::new(PoolOptions::default());
        pool.wait_until_processed().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let pool = Pool::new(PoolOptions { max_workers: 3 });
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.enqueue(Box::new(move || {
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            }));
        }
        pool.wait_until_processed().await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn grow_takes_effect_immediately() {
        let pool = Pool::new(PoolOptions { max_workers: 1 });
        pool.set_max_workers(4);
        assert_eq!(pool.max_workers(), 4);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.enqueue(Box::new(move || {
                Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            }));
        }
        pool.wait_until_processed().await;

        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shrink_mid_flight_completes_existing_jobs() {
        let pool = Pool::new(PoolOptions { max_workers: 4 });
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.enqueue(Box::new(move || {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }));
        }

        // Shrink while jobs are in flight; everything must still run.
        pool.set_max_workers(1);
        pool.wait_until_processed().await;

        assert_eq!(counter.load(Ordering::SeqCst), 8);

        // The shrunken pool keeps serving new work.
        pool.enqueue(counting_job(Arc::clone(&counter)));
        pool.wait_until_processed().await;
        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }
}
