//! Action execution collaborator
//!
//! The deploy/scale/heal/rollback mechanics live outside keel behind
//! [`ActionExecutor`]. [`IdempotentExecutor`] wraps it so each decision
//! executes at most once and executor errors become degraded outcomes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use keel_types::{ActionOutcome, DecisionId, DecisionResult, DecisionType, PostActionHealth};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Failure reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The action ran and failed
    #[error("Action failed: {0}")]
    Failed(String),

    /// The target could not be reached
    #[error("Target unavailable: {0}")]
    Unavailable(String),

    #[error("Action timed out")]
    Timeout,
}

/// Performs an approved decision against the target service and reports
/// the health observed right after it.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, decision: &DecisionResult) -> Result<PostActionHealth, ExecutionError>;

    fn name(&self) -> &str;
}

struct OutcomeSlot {
    cell: Arc<OnceCell<ActionOutcome>>,
    created: Instant,
}

/// Executes each decision id at most once.
///
/// Outcomes are kept until [`IdempotentExecutor::prune`] drops them.
pub struct IdempotentExecutor {
    inner: Arc<dyn ActionExecutor>,
    outcomes: DashMap<DecisionId, OutcomeSlot>,
}

impl IdempotentExecutor {
    pub fn new(inner: Arc<dyn ActionExecutor>) -> Self {
        Self {
            inner,
            outcomes: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Execute `decision`, or return the recorded outcome if it already
    /// ran. The flag is true when this call performed the execution.
    #[instrument(skip(self, decision), fields(decision_id = %decision.decision_id, executor = self.inner.name()))]
    pub async fn execute(&self, decision: &DecisionResult) -> (ActionOutcome, bool) {
        let cell = self
            .outcomes
            .entry(decision.decision_id.clone())
            .or_insert_with(|| OutcomeSlot {
                cell: Arc::new(OnceCell::new()),
                created: Instant::now(),
            })
            .cell
            .clone();

        let fresh = AtomicBool::new(false);
        let outcome = cell
            .get_or_init(|| async {
                fresh.store(true, Ordering::Relaxed);
                match self.inner.execute(decision).await {
                    Ok(health) => ActionOutcome::success(decision, health),
                    Err(e) => {
                        warn!(error = %e, "Executor failed, recording degraded outcome");
                        ActionOutcome::failure(decision, e.to_string())
                    }
                }
            })
            .await
            .clone();

        let fresh = fresh.load(Ordering::Relaxed);
        if !fresh {
            debug!("Decision already executed, returning recorded outcome");
        }
        (outcome, fresh)
    }

    pub fn outcome(&self, decision_id: &DecisionId) -> Option<ActionOutcome> {
        self.outcomes
            .get(decision_id)
            .and_then(|slot| slot.cell.get().cloned())
    }

    pub fn executed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|slot| slot.cell.get().is_some())
            .count()
    }

    /// Forget finished outcomes recorded at least `retention` before `now`.
    /// Executions still running are kept.
    pub fn prune(&self, retention: Duration, now: Instant) -> usize {
        let before = self.outcomes.len();
        self.outcomes
            .retain(|_, slot| slot.cell.get().is_none() || slot.created + retention > now);
        let removed = before.saturating_sub(self.outcomes.len());
        if removed > 0 {
            debug!(removed, "Pruned recorded outcomes");
        }
        removed
    }
}

/// Executor with preset results per decision type, for tests and dry runs.
#[derive(Debug)]
pub struct ScriptedExecutor {
    default: Result<PostActionHealth, ExecutionError>,
    scripts: Mutex<HashMap<DecisionType, Vec<Result<PostActionHealth, ExecutionError>>>>,
    calls: AtomicUsize,
    executed: Mutex<Vec<DecisionId>>,
}

impl ScriptedExecutor {
    /// Every action succeeds with the given health.
    pub fn reporting(health: PostActionHealth) -> Self {
        Self::with_default(Ok(health))
    }

    pub fn failing(error: ExecutionError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default: Result<PostActionHealth, ExecutionError>) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Queue results for one decision type, consumed in order before the
    /// default applies again.
    pub fn script(
        self,
        decision_type: DecisionType,
        results: impl IntoIterator<Item = Result<PostActionHealth, ExecutionError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(decision_type)
            .or_default()
            .extend(results);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<DecisionId> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(&self, decision: &DecisionResult) -> Result<PostActionHealth, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(decision.decision_id.clone());

        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        match scripts.get_mut(&decision.decision_type) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => self.default.clone(),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_decision::DecisionEngine;
    use keel_types::{DecisionIdAllocator, DecisionRequest, Parameter, Priority};

    fn approved(allocator: &DecisionIdAllocator) -> DecisionResult {
        let request = DecisionRequest::builder(DecisionType::Scaling, Priority::Medium, "api")
            .parameter(Parameter::ratio("headroom", 0.9, 1.0))
            .build_with(allocator)
            .unwrap();
        DecisionEngine::default().evaluate(&request)
    }

    #[tokio::test]
    async fn test_executes_once_per_decision() {
        let inner = Arc::new(ScriptedExecutor::reporting(PostActionHealth::Healthy));
        let executor = IdempotentExecutor::new(inner.clone());
        let decision = approved(&DecisionIdAllocator::new());

        let (first, fresh) = executor.execute(&decision).await;
        assert!(fresh);
        assert!(first.is_healthy());

        let (second, fresh) = executor.execute(&decision).await;
        assert!(!fresh);
        assert_eq!(first, second);
        assert_eq!(inner.calls(), 1);
        assert_eq!(executor.executed_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_execution_runs_once() {
        let inner = Arc::new(ScriptedExecutor::reporting(PostActionHealth::Healthy));
        let executor = Arc::new(IdempotentExecutor::new(inner.clone()));
        let decision = approved(&DecisionIdAllocator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let executor = executor.clone();
                let decision = decision.clone();
                tokio::spawn(async move { executor.execute(&decision).await.1 })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            if handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_becomes_degraded_outcome() {
        let inner = Arc::new(ScriptedExecutor::failing(ExecutionError::Timeout));
        let executor = IdempotentExecutor::new(inner);
        let decision = approved(&DecisionIdAllocator::new());

        let (outcome, _) = executor.execute(&decision).await;
        assert!(!outcome.success);
        assert_eq!(outcome.post_action_health, PostActionHealth::Degraded);
        assert_eq!(outcome.error_detail.as_deref(), Some("Action timed out"));
        assert_eq!(executor.outcome(&decision.decision_id), Some(outcome));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_old_outcomes() {
        let inner = Arc::new(ScriptedExecutor::reporting(PostActionHealth::Healthy));
        let executor = IdempotentExecutor::new(inner);
        let allocator = DecisionIdAllocator::new();
        let old = approved(&allocator);
        executor.execute(&old).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        let recent = approved(&allocator);
        executor.execute(&recent).await;

        let retention = Duration::from_secs(60);
        assert_eq!(executor.prune(retention, Instant::now()), 1);
        assert!(executor.outcome(&old.decision_id).is_none());
        assert!(executor.outcome(&recent.decision_id).is_some());
        assert_eq!(executor.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_scripts_consumed_in_order() {
        let inner = ScriptedExecutor::reporting(PostActionHealth::Healthy).script(
            DecisionType::Scaling,
            [Ok(PostActionHealth::Degraded), Err(ExecutionError::Timeout)],
        );
        let decision = approved(&DecisionIdAllocator::new());

        assert_eq!(inner.execute(&decision).await, Ok(PostActionHealth::Degraded));
        assert_eq!(inner.execute(&decision).await, Err(ExecutionError::Timeout));
        assert_eq!(inner.execute(&decision).await, Ok(PostActionHealth::Healthy));
    }
}
