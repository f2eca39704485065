//! End-to-end wave orchestration tests.
//!
//! Covers the happy path, dependency gating under both failure policies,
//! resource exhaustion, memory-pressure wave sizing, and the ordering and
//! arithmetic guarantees of `WaveResult`.

mod common;

use std::time::Instant;

use breakwater::domain::models::{Task, WaveOptions};
use breakwater::infrastructure::runner::MockResponse;

use common::harness;

fn tasks_abc() -> Vec<Task> {
    vec![
        Task::new("a", "implement module a"),
        Task::new("b", "implement module b"),
        Task::new("c", "implement module c").with_dependencies(["a"]),
    ]
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[tokio::test]
async fn happy_path_two_waves() {
    let h = harness(4);
    let result = h
        .orchestrator
        .execute_wave(
            tasks_abc(),
            WaveOptions {
                wave_size: Some(2),
                continue_on_error: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.tasks.len(), 3);
    assert!(result.tasks.iter().all(|t| t.success));
    assert_eq!(result.total_success, 3);
    assert_eq!(result.total_failure, 0);

    // Two waves: [a, b] then [c]
    assert_eq!(result.waves.len(), 2);
    assert_eq!(result.waves[0].task_count, 2);
    assert_eq!(result.waves[1].task_count, 1);

    // Input order preserved
    let ids: Vec<&str> = result.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn summary_arithmetic_holds() {
    let h = harness(4);
    h.runner
        .script("module b", MockResponse::Failure("b broke".to_string()))
        .await;

    let result = h
        .orchestrator
        .execute_wave(
            tasks_abc(),
            WaveOptions {
                wave_size: Some(2),
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let success_sum: usize = result.waves.iter().map(|w| w.success_count).sum();
    let failure_sum: usize = result.waves.iter().map(|w| w.failure_count).sum();
    let task_sum: usize = result.waves.iter().map(|w| w.task_count).sum();
    assert_eq!(success_sum, result.total_success);
    assert_eq!(failure_sum, result.total_failure);
    assert_eq!(task_sum, result.tasks.len());
    for wave in &result.waves {
        assert_eq!(wave.success_count + wave.failure_count, wave.task_count);
    }
}

// =============================================================================
// DEPENDENCY GATING
// =============================================================================

#[tokio::test]
async fn failed_validation_breaks_dependents_continue_on_error() {
    let h = harness(4);
    // a has an empty prompt and fails validation; c depends on a
    let tasks = vec![
        Task::new("a", ""),
        Task::new("b", "implement module b"),
        Task::new("c", "implement module c").with_dependencies(["a"]),
    ];

    let result = h
        .orchestrator
        .execute_wave(
            tasks,
            WaveOptions {
                wave_size: Some(2),
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.tasks.len(), 3);
    assert!(!result.tasks[0].success);
    assert!(result.tasks[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Task validation failed:"));
    assert!(result.tasks[1].success);
    assert!(!result.tasks[2].success);
    assert_eq!(
        result.tasks[2].error.as_deref(),
        Some("Dependencies not satisfied")
    );
}

#[tokio::test]
async fn failed_validation_stops_run_without_continue_on_error() {
    let h = harness(4);
    let tasks = vec![
        Task::new("a", ""),
        Task::new("b", "implement module b"),
        Task::new("c", "implement module c").with_dependencies(["a"]),
    ];

    let result = h
        .orchestrator
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
    assert_eq!(result.total_failure, 1);
}

#[tokio::test]
async fn dependency_on_unknown_task_fails() {
    let h = harness(2);
    let tasks = vec![Task::new("a", "prompt").with_dependencies(["ghost"])];
    let result = h
        .orchestrator
        .execute_wave(
            tasks,
            WaveOptions {
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        result.tasks[0].error.as_deref(),
        Some("Dependencies not satisfied")
    );
}

// =============================================================================
// RESOURCE EXHAUSTION
// =============================================================================

#[tokio::test]
async fn slot_exhaustion_fails_task_within_poll_budget() {
    let h = harness(1);
    // Hold the only slot so every poll fails
    assert!(h.resources.acquire_slot());

    let started = Instant::now();
    let result = h
        .orchestrator
        .execute_wave(
            vec![Task::new("a", "prompt")],
            WaveOptions {
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(
        result.tasks[0].error.as_deref(),
        Some("Resource limit exceeded - could not acquire slot")
    );
    // 10 polls at 100 ms, sleeping between them
    assert!(elapsed.as_millis() <= 1_500, "waited {elapsed:?}");
}

// =============================================================================
// MEMORY-PRESSURE WAVE SIZING
// =============================================================================

#[tokio::test]
async fn high_memory_pressure_halves_wave_size() {
    let h = harness(4);
    h.memory.set_task_utilization(85.0).await;

    let result = h
        .orchestrator
        .execute_wave(
            vec![
                Task::new("a", "p"),
                Task::new("b", "p"),
                Task::new("c", "p"),
                Task::new("d", "p"),
            ],
            WaveOptions::default(),
        )
        .await
        .unwrap();

    // Base 4 halves to 2: two waves of two
    assert_eq!(result.waves.len(), 2);
    assert!(result.waves.iter().all(|w| w.task_count == 2));
}

#[tokio::test]
async fn memory_budgets_disabled_keeps_full_wave() {
    let h = harness(4);
    h.memory.set_task_utilization(85.0).await;

    let result = h
        .orchestrator
        .execute_wave(
            vec![
                Task::new("a", "p"),
                Task::new("b", "p"),
                Task::new("c", "p"),
                Task::new("d", "p"),
            ],
            WaveOptions {
                use_memory_budgets: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.waves.len(), 1);
    assert_eq!(result.waves[0].task_count, 4);
}

// =============================================================================
// MEMORY EVENTS
// =============================================================================

#[tokio::test]
async fn memory_events_follow_run_structure() {
    let h = harness(4);
    h.orchestrator
        .execute_wave(
            tasks_abc(),
            WaveOptions {
                wave_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let events = h.memory.event_types().await;
    assert!(events.contains(&"orchestration_started".to_string()));
    assert!(events.contains(&"wave_1_start".to_string()));
    assert!(events.contains(&"task_a_start".to_string()));
    assert!(events.contains(&"wave_1_completed".to_string()));
    assert!(events.contains(&"wave_2_start".to_string()));
    assert!(events.contains(&"orchestration_completed".to_string()));
    // Three successful tasks, three AGENT_OUTPUT events
    assert_eq!(events.iter().filter(|e| *e == "AGENT_OUTPUT").count(), 3);

    // Every scope was closed, including GLOBAL
    assert!(h.memory.open_scopes().await.is_empty());
}

#[tokio::test]
async fn task_failure_records_error_event() {
    let h = harness(2);
    h.runner
        .script("module a", MockResponse::Failure("nope".to_string()))
        .await;

    h.orchestrator
        .execute_wave(
            vec![Task::new("a", "implement module a")],
            WaveOptions {
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let events = h.memory.event_types().await;
    assert!(events.contains(&"ERROR".to_string()));
    assert!(!events.contains(&"AGENT_OUTPUT".to_string()));
}

// =============================================================================
// RUNNER ERROR SURFACE
// =============================================================================

#[tokio::test]
async fn runner_failure_message_is_preserved() {
    let h = harness(2);
    h.runner
        .script(
            "module a",
            MockResponse::Failure("provider quota exhausted".to_string()),
        )
        .await;

    let result = h
        .orchestrator
        .execute_wave(
            vec![Task::new("a", "implement module a")],
            WaveOptions {
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        result.tasks[0].error.as_deref(),
        Some("provider quota exhausted")
    );
}

#[tokio::test]
async fn parser_failure_becomes_task_failure() {
    let h = harness(2);
    h.runner
        .script(
            "module a",
            MockResponse::Success("{broken json".to_string()),
        )
        .await;

    let result = h
        .orchestrator
        .execute_wave(
            vec![Task::new("a", "implement module a")],
            WaveOptions {
                continue_on_error: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!result.tasks[0].success);
    assert!(result.tasks[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Response parsing failed:"));
}
