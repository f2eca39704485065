//! Wave Orchestrator
//!
//! Executes a caller-supplied sequence of tasks in consecutive waves,
//! honoring the concurrency budget, dependency gating, per-task validation
//! and parsing, and the per-wave failure policy. Memory events and
//! artifacts are threaded through the memory store as the run progresses.
//!
//! Ordering guarantees: task results appear in input order, waves execute
//! strictly sequentially, and tasks are never reordered to satisfy
//! dependencies. A dependency pointing forward within a wave fails with
//! "Dependencies not satisfied".

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::resource_manager::ResourceManager;
use crate::domain::error::OrchestrationError;
use crate::domain::models::{
    AgentResponse, Task, TaskResult, WaveConfig, WaveOptions, WaveResult, WaveSummary,
};
use crate::domain::ports::{
    AgentRunner, AgentTaskRequest, MemoryEvent, MemoryStore, PromptValidator, ResponseParser,
    ScopeId, ScopeLevel, ScopeSpec,
};

/// Per-task failure reasons surfaced in `TaskResult.error`.
const ERR_DEPENDENCIES: &str = "Dependencies not satisfied";
const ERR_RESOURCE_LIMIT: &str = "Resource limit exceeded - could not acquire slot";

/// Releases an agent slot when the task attempt ends, on every path.
struct SlotGuard<'a> {
    resources: &'a ResourceManager,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.resources.release_slot();
    }
}

/// Drives wave execution against the collaborator ports.
pub struct WaveOrchestrator {
    resources: Arc<ResourceManager>,
    runner: Arc<dyn AgentRunner>,
    validator: Arc<dyn PromptValidator>,
    parser: Arc<dyn ResponseParser>,
    memory: Arc<dyn MemoryStore>,
    config: WaveConfig,
    mock_mode: bool,
    shutdown_tx: broadcast::Sender<()>,
}

impl WaveOrchestrator {
    pub fn new(
        resources: Arc<ResourceManager>,
        runner: Arc<dyn AgentRunner>,
        validator: Arc<dyn PromptValidator>,
        parser: Arc<dyn ResponseParser>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            resources,
            runner,
            validator,
            parser,
            memory,
            config: WaveConfig::default(),
            mock_mode: false,
            shutdown_tx,
        }
    }

    /// Override slot-polling configuration.
    pub fn with_config(mut self, config: WaveConfig) -> Self {
        self.config = config;
        self
    }

    /// In mock mode the runner is never called; every task synthesizes a
    /// successful response after validation.
    pub fn with_mock_mode(mut self, mock_mode: bool) -> Self {
        self.mock_mode = mock_mode;
        self
    }

    /// Handle for cancelling slot waits and aborting the run.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Execute `tasks` in waves and return one result per attempted task.
    ///
    /// Per-task failures (dependency gate, slot exhaustion, validation,
    /// runner, parser) become `TaskResult` entries; only memory-store and
    /// bookkeeping failures propagate as errors. The GLOBAL memory scope is
    /// closed on every path.
    pub async fn execute_wave(
        &self,
        tasks: Vec<Task>,
        options: WaveOptions,
    ) -> Result<WaveResult> {
        let wave_size = match options.wave_size {
            Some(size) => size.max(1),
            None => {
                self.resources
                    .compute_wave_size(options.use_memory_budgets)
                    .await
            }
        };

        let global = self
            .memory
            .create_scope(ScopeSpec::new(&options.memory_goal, ScopeLevel::Global))
            .await?;

        info!(
            total_tasks = tasks.len(),
            wave_size,
            continue_on_error = options.continue_on_error,
            "Starting wave orchestration"
        );

        let outcome = self.run_waves(&tasks, wave_size, &options, global).await;

        match &outcome {
            Ok(result) => {
                self.memory
                    .close_scope(
                        global,
                        &format!(
                            "Orchestration completed: {} succeeded, {} failed",
                            result.total_success, result.total_failure
                        ),
                    )
                    .await?;
            }
            Err(e) => {
                // Best-effort: the original error stays the primary failure.
                let _ = self
                    .memory
                    .add_event(
                        global,
                        MemoryEvent::orchestration_failed(json!({ "error": e.to_string() })),
                    )
                    .await;
                let _ = self
                    .memory
                    .close_scope(global, "Orchestration failed")
                    .await;
            }
        }

        outcome
    }

    async fn run_waves(
        &self,
        tasks: &[Task],
        wave_size: usize,
        options: &WaveOptions,
        global: ScopeId,
    ) -> Result<WaveResult> {
        let start_time = Utc::now();
        let metrics = self.memory.metrics().await.unwrap_or_default();

        self.memory
            .add_event(
                global,
                MemoryEvent::orchestration_started(json!({
                    "totalTasks": tasks.len(),
                    "waveSize": wave_size,
                    "memoryMetrics": metrics,
                })),
            )
            .await?;
        self.memory
            .set_artifact(
                global,
                "wave_config",
                json!({
                    "totalTasks": tasks.len(),
                    "waveSize": wave_size,
                    "useMemoryBudgets": options.use_memory_budgets,
                    "startTime": start_time,
                }),
            )
            .await?;

        let mut waves: Vec<Vec<TaskResult>> = Vec::new();
        let mut aborted = false;

        for (index, chunk) in tasks.chunks(wave_size).enumerate() {
            let wave_number = index + 1;
            let task_scope = self
                .memory
                .create_scope(ScopeSpec::new(
                    format!("Wave {wave_number}"),
                    ScopeLevel::Task,
                ))
                .await?;
            self.memory
                .add_event(task_scope, MemoryEvent::wave_start(wave_number))
                .await?;
            info!(wave = wave_number, tasks = chunk.len(), "Wave started");

            let mut wave_results: Vec<TaskResult> = Vec::new();
            for task in chunk {
                let result = self
                    .run_task(task, wave_number, &waves, &wave_results)
                    .await?;
                let failed = !result.success;
                wave_results.push(result);

                if failed && !options.continue_on_error {
                    warn!(
                        wave = wave_number,
                        task_id = %task.id,
                        "Task failed; stopping run"
                    );
                    aborted = true;
                    break;
                }
            }

            let summary = WaveSummary::from_results(wave_number, &wave_results);
            self.memory
                .set_artifact(
                    task_scope,
                    &format!("wave_{wave_number}_summary"),
                    serde_json::to_value(&summary)?,
                )
                .await?;
            self.memory
                .add_event(
                    task_scope,
                    MemoryEvent::wave_completed(wave_number, serde_json::to_value(&summary)?),
                )
                .await?;
            self.memory
                .close_scope(
                    task_scope,
                    &format!(
                        "Wave {wave_number}: {}/{} succeeded",
                        summary.success_count, summary.task_count
                    ),
                )
                .await?;

            waves.push(wave_results);
            if aborted {
                break;
            }
        }

        let result = WaveResult::from_waves(waves);
        self.memory
            .add_event(
                global,
                MemoryEvent::orchestration_completed(json!({
                    "totalSuccess": result.total_success,
                    "totalFailure": result.total_failure,
                    "waves": result.waves.len(),
                })),
            )
            .await?;
        Ok(result)
    }

    /// Run one task inside its LOCAL scope, recording the result artifact
    /// and the AGENT_OUTPUT / ERROR event.
    async fn run_task(
        &self,
        task: &Task,
        wave_number: usize,
        prior_waves: &[Vec<TaskResult>],
        current_wave: &[TaskResult],
    ) -> Result<TaskResult> {
        let local = self
            .memory
            .create_scope(ScopeSpec::new(
                format!("Task {}", task.id),
                ScopeLevel::Local,
            ))
            .await?;
        self.memory
            .add_event(local, MemoryEvent::task_start(&task.id))
            .await?;

        let result = self
            .attempt_task(task, wave_number, prior_waves, current_wave)
            .await?;

        self.memory
            .set_artifact(
                local,
                &format!("task_{}_result", task.id),
                serde_json::to_value(&result)?,
            )
            .await?;
        let event = if result.success {
            MemoryEvent::agent_output(json!({
                "taskId": task.id,
                "summary": result.response.as_ref().map(|r| r.summary.clone()),
            }))
        } else {
            MemoryEvent::error(json!({
                "taskId": task.id,
                "error": result.error,
            }))
        };
        self.memory.add_event(local, event).await?;
        self.memory
            .close_scope(
                local,
                if result.success {
                    "Task completed"
                } else {
                    "Task failed"
                },
            )
            .await?;

        Ok(result)
    }

    /// The per-task pipeline: dependency gate, slot acquisition, prompt
    /// validation, execution, parsing. Every failure becomes a `TaskResult`.
    async fn attempt_task(
        &self,
        task: &Task,
        wave_number: usize,
        prior_waves: &[Vec<TaskResult>],
        current_wave: &[TaskResult],
    ) -> Result<TaskResult> {
        // Dependency gate: every referenced id must have succeeded in a
        // prior wave or earlier in this wave.
        if !task.dependencies.is_empty() {
            let satisfied = task.dependencies.iter().all(|dep| {
                prior_waves
                    .iter()
                    .flatten()
                    .chain(current_wave)
                    .any(|r| r.id == *dep && r.success)
            });
            if !satisfied {
                debug!(task_id = %task.id, "Dependency gate failed");
                return Ok(TaskResult::failed(&task.id, ERR_DEPENDENCIES));
            }
        }

        // Slot acquisition: poll, waiting between attempts.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut acquired = false;
        for attempt in 0..self.config.slot_max_attempts {
            if self.resources.can_spawn_agent() && self.resources.acquire_slot() {
                acquired = true;
                break;
            }
            if attempt + 1 < self.config.slot_max_attempts {
                tokio::select! {
                    () = sleep(Duration::from_millis(self.config.slot_poll_interval_ms)) => {}
                    _ = shutdown_rx.recv() => {
                        return Err(OrchestrationError::Cancelled { wave_number }.into());
                    }
                }
            }
        }
        if !acquired {
            warn!(task_id = %task.id, "Could not acquire agent slot");
            return Ok(TaskResult::failed(&task.id, ERR_RESOURCE_LIMIT));
        }
        let _slot = SlotGuard {
            resources: self.resources.as_ref(),
        };

        // Prompt validation
        let validation = self.validator.validate(&task.prompt);
        if !validation.valid {
            return Ok(TaskResult::failed(
                &task.id,
                format!("Task validation failed: {}", validation.errors.join(", ")),
            ));
        }

        Ok(self.execute_task(task).await)
    }

    /// Execute one validated task via the runner (or synthesize in mock
    /// mode) and parse the response.
    async fn execute_task(&self, task: &Task) -> TaskResult {
        if self.mock_mode {
            return TaskResult::succeeded(
                &task.id,
                AgentResponse::summary_only(format!("Mock execution of task {}", task.id)),
            )
            .with_attribution(Some("mock".to_string()), Some("mock".to_string()));
        }

        let run = match self
            .runner
            .run_agent(AgentTaskRequest::new(&task.prompt))
            .await
        {
            Ok(run) => run,
            Err(e) => {
                return TaskResult::failed(&task.id, format!("Agent execution failed: {e}"));
            }
        };

        if !run.success {
            let message = run
                .error
                .map(|f| f.message)
                .unwrap_or_else(|| "Agent execution failed".to_string());
            return TaskResult::failed(&task.id, message);
        }

        let raw = run.agent_response.unwrap_or_default();
        let parsed = self.parser.parse(&raw);
        match (parsed.success, parsed.data) {
            (true, Some(response)) => TaskResult::succeeded(&task.id, response)
                .with_attribution(run.provider_used, run.model_used),
            _ => TaskResult::failed(
                &task.id,
                format!(
                    "Response parsing failed: {}",
                    parsed
                        .error
                        .unwrap_or_else(|| "parser returned no data".to_string())
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        AgentRunResult, MemoryMetrics, ParseOutcome, RunnerFailure, ValidationOutcome,
    };
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    /// Memory store that records event labels per scope level.
    #[derive(Default)]
    struct RecordingMemory {
        events: StdMutex<Vec<String>>,
        open_scopes: StdMutex<HashMap<ScopeId, ScopeLevel>>,
        closed: StdMutex<Vec<ScopeLevel>>,
    }

    #[async_trait]
    impl MemoryStore for RecordingMemory {
        async fn create_scope(&self, spec: ScopeSpec) -> Result<ScopeId> {
            let id = Uuid::new_v4();
            self.open_scopes.lock().unwrap().insert(id, spec.level);
            Ok(id)
        }

        async fn add_event(&self, _scope: ScopeId, event: MemoryEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.event_type);
            Ok(())
        }

        async fn set_artifact(&self, _scope: ScopeId, _key: &str, _value: Value) -> Result<()> {
            Ok(())
        }

        async fn metrics(&self) -> Result<MemoryMetrics> {
            Ok(MemoryMetrics::default())
        }

        async fn close_scope(&self, scope: ScopeId, _summary: &str) -> Result<()> {
            if let Some(level) = self.open_scopes.lock().unwrap().remove(&scope) {
                self.closed.lock().unwrap().push(level);
            }
            Ok(())
        }
    }

    struct ScriptedRunner {
        failures: Vec<String>,
    }

    #[async_trait]
    impl AgentRunner for ScriptedRunner {
        async fn run_agent(&self, request: AgentTaskRequest) -> Result<AgentRunResult> {
            let fails = self.failures.iter().any(|p| request.prompt.contains(p));
            if fails {
                Ok(AgentRunResult {
                    success: false,
                    agent_response: None,
                    provider_used: None,
                    model_used: None,
                    error: Some(RunnerFailure {
                        message: "scripted failure".to_string(),
                    }),
                })
            } else {
                Ok(AgentRunResult {
                    success: true,
                    agent_response: Some("all good".to_string()),
                    provider_used: Some("test-provider".to_string()),
                    model_used: Some("test-model".to_string()),
                    error: None,
                })
            }
        }
    }

    struct NonEmptyValidator;

    impl PromptValidator for NonEmptyValidator {
        fn validate(&self, prompt: &str) -> ValidationOutcome {
            if prompt.trim().is_empty() {
                ValidationOutcome::invalid(vec!["prompt is empty".to_string()])
            } else {
                ValidationOutcome::ok()
            }
        }
    }

    struct PassthroughParser;

    impl ResponseParser for PassthroughParser {
        fn parse(&self, raw: &str) -> ParseOutcome {
            ParseOutcome::parsed(AgentResponse::summary_only(raw))
        }
    }

    fn orchestrator(max_concurrent: usize, failures: Vec<&str>) -> (WaveOrchestrator, Arc<RecordingMemory>) {
        let memory = Arc::new(RecordingMemory::default());
        let orchestrator = WaveOrchestrator::new(
            Arc::new(ResourceManager::new(max_concurrent)),
            Arc::new(ScriptedRunner {
                failures: failures.into_iter().map(String::from).collect(),
            }),
            Arc::new(NonEmptyValidator),
            Arc::new(PassthroughParser),
            memory.clone(),
        );
        (orchestrator, memory)
    }

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        let (orchestrator, _) = orchestrator(4, vec![]);
        let tasks = vec![
            Task::new("a", "first"),
            Task::new("b", "second"),
            Task::new("c", "third"),
        ];
        let result = orchestrator
            .execute_wave(
                tasks,
                WaveOptions {
                    wave_size: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ids: Vec<&str> = result.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(result.waves.len(), 2);
        assert_eq!(result.waves[0].task_count, 2);
        assert_eq!(result.waves[1].task_count, 1);
        assert_eq!(result.total_success, 3);
    }

    #[tokio::test]
    async fn test_attribution_from_runner() {
        let (orchestrator, _) = orchestrator(2, vec![]);
        let result = orchestrator
            .execute_wave(vec![Task::new("a", "p")], WaveOptions::default())
            .await
            .unwrap();
        assert_eq!(result.tasks[0].provider_used.as_deref(), Some("test-provider"));
        assert_eq!(result.tasks[0].model_used.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_validation_failure_message() {
        let (orchestrator, _) = orchestrator(2, vec![]);
        let result = orchestrator
            .execute_wave(
                vec![Task::new("a", "  ")],
                WaveOptions {
                    continue_on_error: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            result.tasks[0].error.as_deref(),
            Some("Task validation failed: prompt is empty")
        );
    }

    #[tokio::test]
    async fn test_same_wave_forward_dependency_fails() {
        let (orchestrator, _) = orchestrator(4, vec![]);
        // b depends on c which runs later in the same wave: never reordered
        let tasks = vec![
            Task::new("a", "p"),
            Task::new("b", "p").with_dependencies(["c"]),
            Task::new("c", "p"),
        ];
        let result = orchestrator
            .execute_wave(
                tasks,
                WaveOptions {
                    wave_size: Some(3),
                    continue_on_error: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result.tasks[0].success);
        assert_eq!(
            result.tasks[1].error.as_deref(),
            Some("Dependencies not satisfied")
        );
        assert!(result.tasks[2].success);
    }

    #[tokio::test]
    async fn test_same_wave_backward_dependency_succeeds() {
        let (orchestrator, _) = orchestrator(4, vec![]);
        let tasks = vec![
            Task::new("a", "p"),
            Task::new("b", "p").with_dependencies(["a"]),
        ];
        let result = orchestrator
            .execute_wave(
                tasks,
                WaveOptions {
                    wave_size: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.total_success, 2);
    }

    #[tokio::test]
    async fn test_stop_on_first_failure() {
        let (orchestrator, _) = orchestrator(4, vec!["boom"]);
        let tasks = vec![
            Task::new("a", "boom"),
            Task::new("b", "fine"),
            Task::new("c", "fine"),
        ];
        let result = orchestrator
            .execute_wave(
                tasks,
                WaveOptions {
                    wave_size: Some(2),
                    continue_on_error: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Only a was attempted
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].id, "a");
        assert!(!result.tasks[0].success);
        assert_eq!(result.total_failure, 1);
    }

    #[tokio::test]
    async fn test_mock_mode_skips_runner() {
        let memory = Arc::new(RecordingMemory::default());
        struct PanickingRunner;
        #[async_trait]
        impl AgentRunner for PanickingRunner {
            async fn run_agent(&self, _request: AgentTaskRequest) -> Result<AgentRunResult> {
                panic!("mock mode must not call the runner");
            }
        }
        let orchestrator = WaveOrchestrator::new(
            Arc::new(ResourceManager::new(2)),
            Arc::new(PanickingRunner),
            Arc::new(NonEmptyValidator),
            Arc::new(PassthroughParser),
            memory,
        )
        .with_mock_mode(true);

        let result = orchestrator
            .execute_wave(vec![Task::new("a", "p")], WaveOptions::default())
            .await
            .unwrap();
        assert!(result.tasks[0].success);
        assert_eq!(result.tasks[0].provider_used.as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn test_memory_event_ordering_and_scope_closure() {
        let (orchestrator, memory) = orchestrator(2, vec![]);
        orchestrator
            .execute_wave(
                vec![Task::new("a", "p"), Task::new("b", "p")],
                WaveOptions {
                    wave_size: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let events = memory.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("orchestration_started"));
        assert_eq!(
            events.last().map(String::as_str),
            Some("orchestration_completed")
        );

        let wave1 = events.iter().position(|e| e == "wave_1_start").unwrap();
        let task_a = events.iter().position(|e| e == "task_a_start").unwrap();
        let wave1_done = events
            .iter()
            .position(|e| e == "wave_1_completed")
            .unwrap();
        let wave2 = events.iter().position(|e| e == "wave_2_start").unwrap();
        assert!(wave1 < task_a);
        assert!(task_a < wave1_done);
        assert!(wave1_done < wave2);

        // Every scope opened was closed
        assert!(memory.open_scopes.lock().unwrap().is_empty());
        let closed = memory.closed.lock().unwrap();
        assert!(closed.contains(&ScopeLevel::Global));
    }

    #[tokio::test]
    async fn test_slot_released_after_each_task() {
        let (orchestrator, _) = orchestrator(1, vec![]);
        // With one slot, three sequential tasks only pass if slots release
        let result = orchestrator
            .execute_wave(
                vec![
                    Task::new("a", "p"),
                    Task::new("b", "p"),
                    Task::new("c", "p"),
                ],
                WaveOptions {
                    wave_size: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.total_success, 3);
        assert_eq!(orchestrator.resources.active_agents(), 0);
    }
}
