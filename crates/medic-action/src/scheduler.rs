//! Scheduler loop: drains the pending queue in batches.
//!
//! Each tick snapshots the pending actions, resolves conflicts within that
//! batch, cancels the losers and executes the survivors concurrently through
//! the executor registry. The scheduler is the only writer of the
//! `running`, `completed` and `failed` states.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use medic_core::config::SchedulerConfig;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::conflict::ConflictResolver;
use crate::error::{ExecutorError, SchedulerError};
use crate::events::EngineEvent;
use crate::executor::ExecutorRegistry;
use crate::store::ActionStore;
use crate::types::{Action, ActionStatus, ExecutionOutcome};

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub batch: usize,
    pub conflicts: usize,
    pub cancelled: usize,
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Background worker that processes the action queue on a fixed interval.
pub struct Scheduler {
    store: Arc<ActionStore>,
    resolver: ConflictResolver,
    registry: Arc<ExecutorRegistry>,
    config: SchedulerConfig,
    /// Stop flag. Reset by `start`, so a stale request never ends a later run.
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        store: Arc<ActionStore>,
        resolver: ConflictResolver,
        registry: Arc<ExecutorRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            registry,
            config,
            shutdown: watch::channel(false).0,
            running: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Process one batch.
    ///
    /// Per-action failures are recorded on the action and never returned;
    /// an `Err` means the store itself could not be read or written.
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        let started_at = Instant::now();
        let batch = self.store.pending_snapshot()?;
        if batch.is_empty() {
            return Ok(TickReport::default());
        }

        let mut report = TickReport {
            batch: batch.len(),
            ..TickReport::default()
        };

        let (conflicts, resolution) = self.resolver.partition(&batch);
        report.conflicts = conflicts.len();
        for conflict in &conflicts {
            self.store.metrics().record_conflict(conflict.kind.as_str());
        }

        for cancellation in &resolution.cancelled {
            if self
                .store
                .cancel_for_conflict(&cancellation.loser.id, &cancellation.winner_id)?
            {
                report.cancelled += 1;
                self.store.publish(EngineEvent::ConflictResolved {
                    winner: cancellation.winner_id.clone(),
                    loser: cancellation.loser.id.clone(),
                    conflict_type: cancellation.kind.to_string(),
                    rule: cancellation.rule.to_string(),
                });
            }
        }

        let mut to_run = Vec::with_capacity(resolution.kept.len());
        for action in &resolution.kept {
            if let Some(running) = self.store.start(&action.id)? {
                to_run.push(running);
            }
        }
        report.started = to_run.len();

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_executions.max(1)));
        let mut handles = Vec::with_capacity(to_run.len());
        for action in to_run {
            let permits = Arc::clone(&permits);
            let registry = Arc::clone(&self.registry);
            let id = action.id.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ExecutorError::Failed(e.to_string()))?;
                dispatch(&registry, &action).await
            });
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ExecutorError::Panicked(e.to_string())),
            };
            let finished = match result {
                Ok(outcome) => {
                    tracing::debug!(
                        action_id = %id,
                        dry_run = outcome.dry_run,
                        "{}",
                        outcome.message
                    );
                    self.store.complete(&id)
                }
                Err(e) => self.store.fail(&id, e.to_string()),
            };
            match finished {
                Ok(action) if action.status == ActionStatus::Completed => report.completed += 1,
                Ok(action) if action.status == ActionStatus::Failed => report.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(action_id = %id, error = %e, "Failed to record action outcome")
                }
            }
        }

        let elapsed = started_at.elapsed().as_secs_f64();
        self.store.metrics().observe_tick(elapsed);
        tracing::debug!(
            batch = report.batch,
            conflicts = report.conflicts,
            cancelled = report.cancelled,
            completed = report.completed,
            failed = report.failed,
            elapsed_seconds = elapsed,
            "Tick processed"
        );
        Ok(report)
    }

    /// Spawn the loop on the runtime. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Scheduler already running");
            return None;
        }
        self.shutdown.send_replace(false);
        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move { scheduler.run().await }))
    }

    /// Tick on the configured interval until shutdown.
    ///
    /// A failed tick is logged and followed by the error backoff; the loop
    /// itself never exits on error. A stop requested before the call is
    /// honoured; only `start` clears it.
    pub async fn run(&self) {
        let mut stop = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        self.store.metrics().set_running(true);
        self.store.publish(EngineEvent::EngineStarted);
        tracing::info!(
            tick_interval_secs = self.config.tick_interval_secs,
            max_concurrent = self.config.max_concurrent_executions,
            "Scheduler started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        loop {
            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(report) if report.batch > 0 => {
                    tracing::info!(
                        batch = report.batch,
                        cancelled = report.cancelled,
                        completed = report.completed,
                        failed = report.failed,
                        "Batch processed"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Scheduler tick failed");
                    tokio::select! {
                        biased;
                        _ = stop.wait_for(|stopped| *stopped) => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.store.metrics().set_running(false);
        self.store.publish(EngineEvent::EngineStopped);
        tracing::info!("Scheduler stopped");
    }

    /// Signal the loop to stop after the current tick.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Run one action through its executor, bounded by the type's timeout.
async fn dispatch(
    registry: &ExecutorRegistry,
    action: &Action,
) -> Result<ExecutionOutcome, ExecutorError> {
    let executor = registry
        .get(action.action_type)
        .ok_or(ExecutorError::Unregistered(action.action_type))?;
    let limit = registry.timeout_for(action.action_type);
    tracing::info!(
        action_id = %action.id,
        description = %executor.describe(action),
        "Executing action"
    );

    match tokio::time::timeout(limit, executor.execute(action)).await {
        Ok(result) => result,
        Err(_) => Err(ExecutorError::Timeout(limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::metrics::EngineMetrics;
    use crate::types::{ActionPatch, ActionRequest, ActionSource, ActionType};
    use async_trait::async_trait;
    use medic_core::config::ExecutorConfig;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Hang,
        Panic,
    }

    struct ScriptedExecutor {
        action_type: ActionType,
        behavior: Behavior,
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        fn action_type(&self) -> ActionType {
            self.action_type
        }

        async fn execute(&self, action: &Action) -> Result<ExecutionOutcome, ExecutorError> {
            match self.behavior {
                Behavior::Succeed => Ok(ExecutionOutcome::new(format!("ok {}", action.id))),
                Behavior::Fail => Err(ExecutorError::Failed("node unreachable".to_string())),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Behavior::Panic => panic!("executor bug"),
            }
        }

        fn describe(&self, action: &Action) -> String {
            format!("scripted {}", action.id)
        }
    }

    fn store() -> Arc<ActionStore> {
        Arc::new(ActionStore::new(Arc::new(EngineMetrics::new().unwrap())))
    }

    fn scheduler_with(store: &Arc<ActionStore>, registry: ExecutorRegistry) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            Arc::clone(store),
            ConflictResolver::default(),
            Arc::new(registry),
            SchedulerConfig {
                tick_interval_secs: 1,
                max_concurrent_executions: 4,
                error_backoff_secs: 1,
            },
        ))
    }

    fn scheduler(store: &Arc<ActionStore>) -> Arc<Scheduler> {
        scheduler_with(store, ExecutorRegistry::with_defaults(&ExecutorConfig::default()))
    }

    fn submit(
        store: &ActionStore,
        id: &str,
        action_type: ActionType,
        source: ActionSource,
        priority: u8,
        target: &str,
        confidence: Option<f64>,
    ) {
        let mut request = ActionRequest::new(action_type, source, priority, target).with_id(id);
        if let Some(c) = confidence {
            request = request.with_confidence(c);
        }
        store.submit(request.into_action().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_empty_tick() {
        let store = store();
        let report = scheduler(&store).tick().await.unwrap();
        assert_eq!(report, TickReport::default());
        assert_eq!(store.metrics().ticks_observed(), 0);
    }

    #[tokio::test]
    async fn test_deterministic_beats_ai_on_same_target() {
        let store = store();
        submit(&store, "A", ActionType::NodeRemediation, ActionSource::Deterministic, 5, "node1", None);
        submit(&store, "B", ActionType::ResourceScaling, ActionSource::AiDriven, 9, "node1", Some(0.9));

        let report = scheduler(&store).tick().await.unwrap();
        assert_eq!(report.batch, 2);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.completed, 1);

        let a = store.get("A").unwrap();
        assert_eq!(a.status, ActionStatus::Completed);
        assert!(a.started_at.is_some());
        assert!(a.completed_at.is_some());

        let b = store.get("B").unwrap();
        assert_eq!(b.status, ActionStatus::Cancelled);
        assert!(b.started_at.is_none());
        assert_eq!(b.error_message.as_deref(), Some("superseded by A"));
    }

    #[tokio::test]
    async fn test_disjoint_actions_both_complete() {
        let store = store();
        submit(&store, "C", ActionType::NodeRemediation, ActionSource::Manual, 3, "podX", None);
        submit(&store, "D", ActionType::ModelInference, ActionSource::Manual, 8, "podY", None);

        let report = scheduler(&store).tick().await.unwrap();
        assert_eq!(report.conflicts, 0);
        assert_eq!(report.completed, 2);
        assert_eq!(store.get("C").unwrap().status, ActionStatus::Completed);
        assert_eq!(store.get("D").unwrap().status, ActionStatus::Completed);
    }

    #[tokio::test]
    async fn test_low_confidence_ai_loses_despite_priority() {
        let store = store();
        submit(&store, "E", ActionType::AlertCorrelation, ActionSource::AiDriven, 9, "svc1", Some(0.4));
        submit(&store, "F", ActionType::AlertCorrelation, ActionSource::Manual, 2, "svc1", None);

        scheduler(&store).tick().await.unwrap();
        assert_eq!(store.get("E").unwrap().status, ActionStatus::Cancelled);
        assert_eq!(store.get("F").unwrap().status, ActionStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_before_tick_never_runs() {
        let store = store();
        submit(&store, "G", ActionType::NodeRemediation, ActionSource::Manual, 5, "node2", None);
        store.cancel("G").unwrap();

        let report = scheduler(&store).tick().await.unwrap();
        assert_eq!(report.started, 0);

        let g = store.get("G").unwrap();
        assert_eq!(g.status, ActionStatus::Cancelled);
        assert!(g.started_at.is_none());
    }

    #[tokio::test]
    async fn test_queue_empty_after_tick() {
        let store = store();
        submit(&store, "A", ActionType::NodeRemediation, ActionSource::Deterministic, 5, "n1", None);
        submit(&store, "B", ActionType::ResourceScaling, ActionSource::AiDriven, 5, "n2", None);
        submit(&store, "C", ActionType::ModelInference, ActionSource::Manual, 5, "n3", None);

        scheduler(&store).tick().await.unwrap();
        assert_eq!(store.queue_len().unwrap(), 0);
        for id in ["A", "B", "C"] {
            assert!(store.get(id).unwrap().status.is_terminal());
            assert!(!store.is_queued(id).unwrap());
        }
        let stats = store.stats().unwrap();
        assert_eq!(stats.active(), 0);
        assert_eq!(store.metrics().active_actions(), 0);
    }

    #[tokio::test]
    async fn test_terminal_status_is_stable_across_ticks() {
        let store = store();
        let scheduler = scheduler(&store);
        submit(&store, "A", ActionType::NodeRemediation, ActionSource::Manual, 5, "n1", None);
        scheduler.tick().await.unwrap();
        let first = store.get("A").unwrap();

        scheduler.tick().await.unwrap();
        let second = store.get("A").unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.completed_at, second.completed_at);
    }

    #[tokio::test]
    async fn test_executor_failure_is_isolated() {
        let store = store();
        let mut registry = ExecutorRegistry::with_defaults(&ExecutorConfig::default());
        registry.register(Arc::new(ScriptedExecutor {
            action_type: ActionType::NodeRemediation,
            behavior: Behavior::Fail,
        }));
        submit(&store, "bad", ActionType::NodeRemediation, ActionSource::Manual, 5, "n1", None);
        submit(&store, "good", ActionType::ModelInference, ActionSource::Manual, 5, "n2", None);

        let report = scheduler_with(&store, registry).tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);

        let bad = store.get("bad").unwrap();
        assert_eq!(bad.status, ActionStatus::Failed);
        assert_eq!(
            bad.error_message.as_deref(),
            Some("Executor failed: node unreachable")
        );
        assert_eq!(store.get("good").unwrap().status, ActionStatus::Completed);
    }

    #[tokio::test]
    async fn test_hanging_executor_times_out_without_stalling_batch() {
        let store = store();
        let mut registry = ExecutorRegistry::with_defaults(&ExecutorConfig::default());
        registry.register(Arc::new(ScriptedExecutor {
            action_type: ActionType::NodeRemediation,
            behavior: Behavior::Hang,
        }));
        registry.set_timeout(ActionType::NodeRemediation, Duration::from_millis(50));
        submit(&store, "stuck", ActionType::NodeRemediation, ActionSource::Manual, 5, "n1", None);
        submit(&store, "quick", ActionType::AlertCorrelation, ActionSource::Manual, 5, "n2", None);

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            scheduler_with(&store, registry).tick(),
        )
        .await
        .expect("tick should finish once the timeout fires")
        .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);
        let stuck = store.get("stuck").unwrap();
        assert_eq!(stuck.status, ActionStatus::Failed);
        assert!(stuck.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panicking_executor_fails_action_only() {
        let store = store();
        let mut registry = ExecutorRegistry::with_defaults(&ExecutorConfig::default());
        registry.register(Arc::new(ScriptedExecutor {
            action_type: ActionType::ResourceScaling,
            behavior: Behavior::Panic,
        }));
        submit(&store, "boom", ActionType::ResourceScaling, ActionSource::Manual, 5, "n1", None);
        submit(&store, "fine", ActionType::ModelInference, ActionSource::Manual, 5, "n2", None);

        let scheduler = scheduler_with(&store, registry);
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        let boom = store.get("boom").unwrap();
        assert_eq!(boom.status, ActionStatus::Failed);
        assert!(boom.error_message.unwrap().starts_with("Executor panicked"));
        assert_eq!(store.get("fine").unwrap().status, ActionStatus::Completed);

        submit(&store, "next", ActionType::ModelInference, ActionSource::Manual, 5, "n3", None);
        assert_eq!(scheduler.tick().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn test_unregistered_type_fails() {
        let store = store();
        submit(&store, "A", ActionType::ModelInference, ActionSource::Manual, 5, "n1", None);

        scheduler_with(&store, ExecutorRegistry::new()).tick().await.unwrap();
        let a = store.get("A").unwrap();
        assert_eq!(a.status, ActionStatus::Failed);
        assert_eq!(
            a.error_message.as_deref(),
            Some("No executor registered for model_inference")
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_action() {
        let store = store();
        let mut params = crate::types::Parameters::new();
        params.insert("min_replicas".to_string(), serde_json::json!(9));
        params.insert("max_replicas".to_string(), serde_json::json!(2));
        let action = ActionRequest::new(ActionType::ResourceScaling, ActionSource::Manual, 5, "deploy")
            .with_id("scale")
            .with_parameters(params)
            .into_action()
            .unwrap();
        store.submit(action).unwrap();

        scheduler(&store).tick().await.unwrap();
        let scale = store.get("scale").unwrap();
        assert_eq!(scale.status, ActionStatus::Failed);
        assert!(scale.error_message.unwrap().starts_with("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_manual_close_while_running_is_kept() {
        let store = store();
        submit(&store, "A", ActionType::NodeRemediation, ActionSource::Manual, 5, "n1", None);
        store.start("A").unwrap();
        store
            .update(
                "A",
                ActionPatch {
                    status: Some(ActionStatus::Cancelled),
                    ..ActionPatch::default()
                },
            )
            .unwrap();

        store.complete("A").unwrap();
        assert_eq!(store.get("A").unwrap().status, ActionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_tick_records_metrics_and_events() {
        let store = store();
        let mut events = store.subscribe();
        submit(&store, "A", ActionType::NodeRemediation, ActionSource::Deterministic, 5, "node1", None);
        submit(&store, "B", ActionType::ResourceScaling, ActionSource::AiDriven, 9, "node1", Some(0.9));

        scheduler(&store).tick().await.unwrap();
        assert_eq!(store.metrics().conflicts_detected(), 1);
        assert_eq!(store.metrics().ticks_observed(), 1);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert!(names.contains(&"conflict_resolved"));
        assert!(names.contains(&"action_cancelled"));
        assert!(names.contains(&"action_started"));
        assert!(names.contains(&"action_completed"));
    }

    #[tokio::test]
    async fn test_loop_start_and_shutdown() {
        let store = store();
        let scheduler = scheduler(&store);
        let mut events = store.subscribe();

        let handle = scheduler.start().expect("first start spawns the loop");
        assert!(scheduler.is_running());
        assert!(scheduler.start().is_none());

        submit(&store, "A", ActionType::ModelInference, ActionSource::Manual, 5, "n1", None);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get("A").unwrap().status != ActionStatus::Completed {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("loop should process the action");

        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .unwrap();
        assert!(!scheduler.is_running());

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert!(names.contains(&"engine_started"));
        assert_eq!(names.last(), Some(&"engine_stopped"));
    }

    #[tokio::test]
    async fn test_shutdown_before_run_returns() {
        let store = store();
        let scheduler = scheduler(&store);
        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(2), scheduler.run())
            .await
            .expect("run should return after a pending shutdown");
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_stale_shutdown_does_not_stop_next_start() {
        let store = store();
        let scheduler = scheduler(&store);

        // Stop while idle, then start: the loop must keep running.
        scheduler.shutdown();
        let handle = scheduler.start().expect("idle scheduler starts");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert!(scheduler.is_running());

        submit(&store, "A", ActionType::ModelInference, ActionSource::Manual, 5, "n1", None);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get("A").unwrap().status != ActionStatus::Completed {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("loop should process the action");

        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_shutdown() {
        let store = store();
        let scheduler = scheduler(&store);

        let first = scheduler.start().expect("first start spawns the loop");
        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(5), first)
            .await
            .expect("first run should stop")
            .unwrap();
        assert!(!scheduler.is_running());

        // A second shutdown while stopped must not leak into the next run.
        scheduler.shutdown();
        let second = scheduler.start().expect("stopped scheduler restarts");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        assert!(scheduler.is_running());

        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("second run should stop")
            .unwrap();
        assert!(!scheduler.is_running());
    }
}
