//! Test fixtures for engine integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use meridian_goalstate::{Action, ActionPlan, Engine, EngineConfig, Entity};

/// Injectable trace sink recording which actions ran, by entity id.
#[derive(Clone, Default)]
pub struct Trace {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: &str) {
        self.entries.lock().push(id.to_owned());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count_of(&self, id: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == id).count()
    }
}

/// Engine configured for fast test turnaround: three workers, 100ms backoff
/// floor, 200ms ceiling.
pub fn test_engine() -> Engine {
    Engine::new(EngineConfig {
        max_workers: 3,
        failure_retry_delay: Duration::from_millis(100),
        max_retry_delay: Duration::from_millis(200),
    })
}

/// Entity whose action list is selected by its `(state, goal)` pair:
///
/// - `("init", "success")`: one action that records its id.
/// - `("init", "fail")`: one action that records and fails until the
///   per-entity failure budget is spent.
/// - `("multi", "success")`: the recording action followed by the
///   fail-then-succeed action, under a 30s plan timeout.
/// - `("multi", "fail")`: an empty plan.
/// - `("slow", "success")`: one action that sleeps well past the plan's 50ms
///   timeout.
pub struct TestEntity {
    id: String,
    state: &'static str,
    goal: &'static str,
    trace: Trace,
    fail_budget: Arc<Mutex<u32>>,
}

impl TestEntity {
    pub fn new(id: impl Into<String>, state: &'static str, goal: &'static str, trace: Trace) -> Self {
        Self {
            id: id.into(),
            state,
            goal,
            trace,
            fail_budget: Arc::new(Mutex::new(3)),
        }
    }

    fn record_action(&self) -> Action {
        let trace = self.trace.clone();
        let id = self.id.clone();
        Action::new(move |_ctx, _entity| {
            let trace = trace.clone();
            let id = id.clone();
            Box::pin(async move {
                trace.record(&id);
                Ok(())
            })
        })
    }

    fn fail_then_succeed_action(&self) -> Action {
        let trace = self.trace.clone();
        let id = self.id.clone();
        let budget = Arc::clone(&self.fail_budget);
        Action::new(move |_ctx, _entity| {
            let trace = trace.clone();
            let id = id.clone();
            let budget = Arc::clone(&budget);
            Box::pin(async move {
                trace.record(&id);
                let mut remaining = budget.lock();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err("induced failure".into());
                }
                Ok(())
            })
        })
    }

    fn slow_action(&self) -> Action {
        Action::new(move |_ctx, _entity| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
        })
    }
}

impl Entity for TestEntity {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> Value {
        json!(self.state)
    }

    fn goal_state(&self) -> Value {
        json!(self.goal)
    }

    fn action_list(&self, state: Value, goal_state: Value) -> ActionPlan {
        match (state.as_str(), goal_state.as_str()) {
            (Some("init"), Some("success")) => ActionPlan::new(vec![self.record_action()]),
            (Some("init"), Some("fail")) => {
                ActionPlan::new(vec![self.fail_then_succeed_action()])
            }
            (Some("multi"), Some("success")) => ActionPlan::new(vec![
                self.record_action(),
                self.fail_then_succeed_action(),
            ])
            .with_timeout(Duration::from_secs(30)),
            (Some("slow"), Some("success")) => ActionPlan::new(vec![self.slow_action()])
                .with_timeout(Duration::from_millis(50)),
            _ => ActionPlan::empty(),
        }
    }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub async fn wait_for<F>(what: &str, timeout: Duration, cond: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
