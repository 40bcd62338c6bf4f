//! The engine: registry, dispatcher, and per-entity action runner.

use std::cmp;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meridian_pool::{Pool, PoolOptions};
use meridian_queue::DeadlineQueue;

use crate::config::EngineConfig;
use crate::entity::{ActionContext, ActionError, ActionPlan, Entity};
use crate::error::EngineError;

/// Registry entry for a tracked entity.
///
/// `run_lock` serialises action lists per entity; `delay` is the current
/// backoff. The engine map lock is always taken before any item lock, never
/// the other way around.
struct EntityMapItem {
    entity: Arc<dyn Entity>,
    run_lock: tokio::sync::Mutex<()>,
    delay: Mutex<Duration>,
}

struct Lifecycle {
    stop: Option<CancellationToken>,
    dispatcher: Option<JoinHandle<()>>,
}

struct EngineInner {
    config: EngineConfig,
    entities: Mutex<HashMap<String, Arc<EntityMapItem>>>,
    queue: DeadlineQueue,
    pool: Pool,
    lifecycle: Mutex<Lifecycle>,
}

impl EngineInner {
    /// Schedules `id` at the earlier of `deadline` and any deadline it is
    /// already resident at. The entity map lock serialises the
    /// read-modify-write against concurrent enqueues, and an id that has been
    /// deleted from the registry is never re-scheduled.
    fn schedule_min(&self, id: &str, deadline: Instant) {
        let entities = self.entities.lock();
        if !entities.contains_key(id) {
            return;
        }
        let effective = match self.queue.deadline_of(id) {
            Some(existing) => cmp::min(existing, deadline),
            None => deadline,
        };
        self.queue.schedule(id, effective);
    }
}

/// Goal-state convergence engine.
///
/// Cloning is cheap and shares the underlying engine. The engine must be
/// created inside a Tokio runtime: its worker pool spawns tasks at
/// construction.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let pool = Pool::new(PoolOptions {
            max_workers: config.max_workers,
        });
        Self {
            inner: Arc::new(EngineInner {
                config,
                entities: Mutex::new(HashMap::new()),
                queue: DeadlineQueue::new(),
                pool,
                lifecycle: Mutex::new(Lifecycle {
                    stop: None,
                    dispatcher: None,
                }),
            }),
        }
    }

    /// Registers the entity if unknown and schedules its next evaluation no
    /// later than `deadline`.
    ///
    /// Idempotent: re-enqueueing keeps the earlier of the existing and new
    /// deadlines. Calls made while the entity's action list is running take
    /// effect once the run finishes.
    pub fn enqueue(&self, entity: Arc<dyn Entity>, deadline: Instant) {
        let id = entity.id().to_owned();
        {
            let mut entities = self.inner.entities.lock();
            entities.entry(id.clone()).or_insert_with(|| {
                Arc::new(EntityMapItem {
                    entity: Arc::clone(&entity),
                    run_lock: tokio::sync::Mutex::new(()),
                    delay: Mutex::new(Duration::ZERO),
                })
            });
            gauge!("meridian.goalstate.entities").set(entities.len() as f64);
        }
        self.inner.schedule_min(&id, deadline);
    }

    /// Returns true if the entity is currently resident in the deadline
    /// queue.
    #[must_use]
    pub fn is_scheduled(&self, entity: &dyn Entity) -> bool {
        self.inner.queue.contains(entity.id())
    }

    /// Returns the deadline the entity is scheduled at, if any.
    #[must_use]
    pub fn scheduled_deadline(&self, entity: &dyn Entity) -> Option<Instant> {
        self.inner.queue.deadline_of(entity.id())
    }

    /// Removes the entity from the registry and from any scheduling.
    ///
    /// Safe to call for an entity the engine has never seen.
    pub fn delete(&self, entity: &dyn Entity) {
        let id = entity.id();
        let removed = {
            let mut entities = self.inner.entities.lock();
            let removed = entities.remove(id).is_some();
            gauge!("meridian.goalstate.entities").set(entities.len() as f64);
            removed
        };
        self.inner.queue.cancel(id);
        if removed {
            debug!(id, "entity deleted");
        }
    }

    /// Number of entities currently tracked in the registry.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.inner.entities.lock().len()
    }

    /// Current backoff delay of a tracked entity.
    #[must_use]
    pub fn retry_delay(&self, entity: &dyn Entity) -> Option<Duration> {
        let entities = self.inner.entities.lock();
        entities.get(entity.id()).map(|item| *item.delay.lock())
    }

    /// Starts the dispatcher. A second call on a running engine is a no-op.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.stop.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let stop = token.clone();
        lifecycle.dispatcher = Some(tokio::spawn(run_dispatcher(inner, stop)));
        lifecycle.stop = Some(token);
        info!("goal state engine started");
    }

    /// Stops the dispatcher and drains in-flight action lists before
    /// returning. A second call on a stopped engine is a no-op; `start` may
    /// be called again afterwards.
    pub async fn stop(&self) {
        let (token, handle) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            (lifecycle.stop.take(), lifecycle.dispatcher.take())
        };
        let Some(token) = token else {
            return;
        };

        token.cancel();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.inner.pool.wait_until_processed().await;
        info!("goal state engine stopped");
    }

    /// Returns true while the dispatcher is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().stop.is_some()
    }
}

async fn run_dispatcher(inner: Arc<EngineInner>, stop: CancellationToken) {
    while let Some(popped) = inner.queue.wait_and_pop(&stop).await {
        let item = inner.entities.lock().get(&popped.id).cloned();
        let Some(item) = item else {
            // Deleted between pop and lookup; stale queue entry, skip it.
            debug!(id = %popped.id, "dequeued entity no longer registered");
            continue;
        };

        let job_inner = Arc::clone(&inner);
        let job_stop = stop.clone();
        inner
            .pool
            .enqueue(Box::new(move || Box::pin(run_entity(job_inner, item, job_stop))));
    }
    debug!("dispatcher exited");
}

async fn run_entity(inner: Arc<EngineInner>, item: Arc<EntityMapItem>, stop: CancellationToken) {
    // At most one action list per entity at a time.
    let _guard = item.run_lock.lock().await;

    let entity = Arc::clone(&item.entity);
    let id = entity.id().to_owned();
    let state = entity.state();
    let goal = entity.goal_state();
    let plan = entity.action_list(state, goal);

    if plan.is_empty() {
        *item.delay.lock() = Duration::ZERO;
        counter!("meridian.goalstate.runs", "outcome" => "empty").increment(1);
        return;
    }

    let token = stop.child_token();
    let ctx = ActionContext::new(token.clone());
    let run = run_actions(&plan, ctx, Arc::clone(&entity));
    let result = match plan.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Canceled.into()),
        },
        None => run.await,
    };
    // Cancel the run token on the way out, like a deferred cancel func.
    token.cancel();

    match result {
        Ok(()) => {
            *item.delay.lock() = Duration::ZERO;
            counter!("meridian.goalstate.runs", "outcome" => "success").increment(1);
            debug!(id = %id, "action list succeeded");
        }
        Err(err) => {
            let delay = {
                let mut delay = item.delay.lock();
                let doubled = delay
                    .checked_mul(2)
                    .unwrap_or(inner.config.max_retry_delay);
                *delay = cmp::min(
                    cmp::max(doubled, inner.config.failure_retry_delay),
                    inner.config.max_retry_delay,
                );
                *delay
            };
            counter!("meridian.goalstate.runs", "outcome" => "failure").increment(1);
            warn!(id = %id, error = %err, retry_in = ?delay, "action list failed");
            inner.schedule_min(&id, Instant::now() + delay);
        }
    }
}

async fn run_actions(
    plan: &ActionPlan,
    ctx: ActionContext,
    entity: Arc<dyn Entity>,
) -> std::result::Result<(), ActionError> {
    for action in &plan.actions {
        if ctx.is_cancelled() {
            return Err(EngineError::Canceled.into());
        }
        action.run(ctx.clone(), Arc::clone(&entity)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    struct IdleEntity {
        id: String,
    }

    impl Entity for IdleEntity {
        fn id(&self) -> &str {
            &self.id
        }

        fn state(&self) -> Value {
            Value::Null
        }

        fn goal_state(&self) -> Value {
            Value::Null
        }

        fn action_list(&self, _state: Value, _goal_state: Value) -> ActionPlan {
            ActionPlan::empty()
        }
    }

    fn idle(id: &str) -> Arc<dyn Entity> {
        Arc::new(IdleEntity { id: id.to_owned() })
    }

    #[tokio::test]
    async fn start_stop_is_reentrant_safe() {
        let engine = Engine::new(EngineConfig::default());
        assert!(!engine.is_running());

        engine.start();
        engine.start();
        assert!(engine.is_running());

        engine.stop().await;
        assert!(!engine.is_running());
        engine.stop().await;

        // Restartable after a full stop.
        engine.start();
        assert!(engine.is_running());
        engine.stop().await;
    }

    #[tokio::test]
    async fn enqueue_registers_and_schedules() {
        let engine = Engine::new(EngineConfig::default());
        let entity = idle("pod-0");

        engine.enqueue(Arc::clone(&entity), Instant::now() + Duration::from_secs(60));
        assert!(engine.is_scheduled(entity.as_ref()));
        assert_eq!(engine.entity_count(), 1);
        assert_eq!(engine.retry_delay(entity.as_ref()), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn enqueue_keeps_the_earlier_deadline() {
        let engine = Engine::new(EngineConfig::default());
        let entity = idle("pod-0");

        let near = Instant::now() + Duration::from_secs(30);
        engine.enqueue(Arc::clone(&entity), near);
        let scheduled = engine.scheduled_deadline(entity.as_ref()).unwrap();

        // A later deadline must not push the evaluation back.
        engine.enqueue(Arc::clone(&entity), near + Duration::from_secs(60));
        assert_eq!(engine.scheduled_deadline(entity.as_ref()), Some(scheduled));

        // An earlier deadline tightens it.
        let sooner = Instant::now();
        engine.enqueue(Arc::clone(&entity), sooner);
        let tightened = engine.scheduled_deadline(entity.as_ref()).unwrap();
        assert!(tightened <= scheduled);
    }

    #[tokio::test]
    async fn delete_unknown_entity_is_safe() {
        let engine = Engine::new(EngineConfig::default());
        let entity = idle("ghost");

        engine.delete(entity.as_ref());
        assert_eq!(engine.entity_count(), 0);
        assert!(!engine.is_scheduled(entity.as_ref()));
    }

    #[tokio::test]
    async fn delete_removes_registration_and_scheduling() {
        let engine = Engine::new(EngineConfig::default());
        let entity = idle("pod-0");

        engine.enqueue(Arc::clone(&entity), Instant::now() + Duration::from_secs(60));
        engine.delete(entity.as_ref());

        assert_eq!(engine.entity_count(), 0);
        assert!(!engine.is_scheduled(entity.as_ref()));
        assert_eq!(engine.retry_delay(entity.as_ref()), None);
    }
}
