//! Retry, circuit-breaker, and checkpoint-resumable execution.
//!
//! The `RecoveryEngine` wraps arbitrary async callables with fault-tolerance
//! semantics. It is the only component that retries user code, and it never
//! double-catches: the last underlying error is preserved through every
//! wrapper.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::sync::{broadcast, Mutex};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
use crate::domain::error::RecoveryError;
use crate::domain::models::{Task, TaskResult, WaveResult, WaveState, WaveSummary};
use crate::domain::models::task::AgentResponse;
use crate::domain::ports::StateStore;

/// Exponential-backoff retry options. Every field has a documented default.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first (default 3, must be >= 1)
    pub max_attempts: u32,

    /// Delay before the first retry (default 1 s)
    pub base_delay: Duration,

    /// Cap on the exponential delay (default 30 s, must be >= base_delay)
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl From<&crate::domain::models::RetryConfig> for RetryOptions {
    fn from(config: &crate::domain::models::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryOptions {
    fn validate(&self) -> Result<(), RecoveryError> {
        if self.max_attempts < 1 {
            return Err(RecoveryError::InvalidRetryOptions(
                "max_attempts must be >= 1".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(RecoveryError::InvalidRetryOptions(format!(
                "base_delay ({:?}) must not exceed max_delay ({:?})",
                self.base_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// Backoff delay for the sleep after a given 0-indexed attempt:
/// `min(base * 2^attempt, max) * (1 + jitter)` with jitter uniform in
/// [-0.25, +0.25), floored at zero.
fn backoff_delay(options: &RetryOptions, attempt: u32) -> Duration {
    let base_ms = options.base_delay.as_millis() as f64;
    let max_ms = options.max_delay.as_millis() as f64;
    let capped = (base_ms * 2f64.powi(attempt as i32)).min(max_ms);
    let jitter: f64 = rand::thread_rng().gen_range(-0.25..0.25);
    let delayed_ms = (capped * (1.0 + jitter)).max(0.0);
    Duration::from_millis(delayed_ms as u64)
}

/// Wraps callables with retry / circuit-breaker / checkpoint semantics.
pub struct RecoveryEngine {
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    retry_options: RetryOptions,
    state_store: Option<Arc<dyn StateStore>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryEngine {
    /// Create an engine with default retry and breaker settings.
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            breaker_config: CircuitBreakerConfig::default(),
            breakers: Mutex::new(HashMap::new()),
            retry_options: RetryOptions::default(),
            state_store: None,
            shutdown_tx,
        }
    }

    /// Override the circuit breaker settings.
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Override the retry options used by checkpoint-resumable execution.
    pub fn with_retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = options;
        self
    }

    /// Attach a state store, enabling checkpoint-resumable execution.
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Handle for cancelling in-flight retry sleeps.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run `operation` up to `max_attempts` times with exponential backoff
    /// between attempts. On exhaustion the last error is carried inside
    /// [`RecoveryError::RetryExhausted`].
    pub async fn retry_with_backoff<F, Fut, T>(
        &self,
        mut operation: F,
        options: &RetryOptions,
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        options.validate()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..options.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = options.max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt + 1 < options.max_attempts {
                let delay = backoff_delay(options, attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::select! {
                    () = sleep(delay) => {}
                    _ = shutdown_rx.recv() => return Err(RecoveryError::Cancelled),
                }
            }
        }

        Err(RecoveryError::RetryExhausted {
            attempts: options.max_attempts,
            last_error: last_error
                .unwrap_or_else(|| anyhow::anyhow!("retry loop made no attempts")),
        })
    }

    /// Run `operation` behind the per-service circuit breaker for
    /// `service_key`. Underlying errors propagate unchanged; a blocked call
    /// fails with [`RecoveryError::CircuitOpen`] without invoking the
    /// operation.
    pub async fn execute_with_circuit_breaker<F, Fut, T>(
        &self,
        service_key: &str,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut breakers = self.breakers.lock().await;
            let breaker = breakers.entry(service_key.to_string()).or_default();
            if !breaker.allows(&self.breaker_config) {
                let opened_at = breaker.opened_at.unwrap_or_else(chrono::Utc::now);
                let retry_after = breaker.retry_after(&self.breaker_config);
                return Err(RecoveryError::CircuitOpen {
                    service: service_key.to_string(),
                    opened_at,
                    retry_after,
                }
                .into());
            }
        }

        // Run outside the lock; transitions re-serialize below.
        let outcome = operation().await;

        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(service_key.to_string()).or_default();
        match &outcome {
            Ok(_) => breaker.record_success(),
            Err(e) => {
                breaker.record_failure(&self.breaker_config);
                if breaker.state == CircuitState::Open {
                    warn!(service = service_key, error = %e, "Circuit opened");
                }
            }
        }
        outcome
    }

    /// Current state of a service's circuit, if one exists.
    pub async fn circuit_state(&self, service_key: &str) -> Option<CircuitState> {
        let breakers = self.breakers.lock().await;
        breakers.get(service_key).map(|b| b.state)
    }

    /// Reporting snapshot of every circuit.
    pub async fn circuit_stats(&self) -> Vec<CircuitStats> {
        let breakers = self.breakers.lock().await;
        breakers
            .iter()
            .map(|(service, b)| CircuitStats {
                service: service.clone(),
                state: b.state.as_str().to_string(),
                failure_count: b.failure_count,
                open_count: b.open_count,
                opened_at: b.opened_at,
                state_changed_at: b.state_changed_at,
            })
            .collect()
    }

    /// Manually reset one circuit.
    pub async fn reset_circuit(&self, service_key: &str) {
        let mut breakers = self.breakers.lock().await;
        if let Some(breaker) = breakers.get_mut(service_key) {
            breaker.reset();
        }
    }

    /// Manually reset all circuits.
    pub async fn reset_all_circuits(&self) {
        let mut breakers = self.breakers.lock().await;
        for breaker in breakers.values_mut() {
            breaker.reset();
        }
    }

    /// Checkpoint-resumable execution.
    ///
    /// Without a state name or store this is a plain call. With both, a
    /// prior checkpoint filters the task list to the tasks not yet recorded;
    /// the remainder runs under `retry_with_backoff`, results are merged
    /// back into the checkpoint, and the checkpoint is saved. When nothing
    /// remains the result is reconstructed from the checkpoint alone, so a
    /// second run after a complete success re-executes nothing.
    pub async fn execute_with_recovery<F, Fut>(
        &self,
        tasks: Vec<Task>,
        state_name: Option<&str>,
        execute_fn: F,
    ) -> Result<WaveResult>
    where
        F: Fn(Vec<Task>) -> Fut,
        Fut: Future<Output = Result<WaveResult>>,
    {
        let (name, store) = match (state_name, &self.state_store) {
            (Some(name), Some(store)) => (name, Arc::clone(store)),
            _ => return execute_fn(tasks).await,
        };

        let submission_order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut state = store
            .load_checkpoint(name)
            .await
            .map_err(RecoveryError::StateStore)?
            .unwrap_or_else(|| WaveState::new(1));

        let remaining: Vec<Task> = tasks
            .into_iter()
            .filter(|t| !state.contains(&t.id))
            .collect();

        if remaining.is_empty() {
            debug!(checkpoint = name, "All tasks recorded; reconstructing result");
            return Ok(reconstruct_from_state(&state, &submission_order));
        }

        let restored: Vec<TaskResult> = submission_order
            .iter()
            .filter_map(|id| restored_result(&state, id))
            .collect();

        let outcome = self
            .retry_with_backoff(|| execute_fn(remaining.clone()), &self.retry_options)
            .await;

        match outcome {
            Ok(result) => {
                state.absorb(&result.tasks);
                if let Some(last) = result.waves.last() {
                    state.wave_number = state.wave_number.max(last.wave_number as u32);
                }
                store
                    .save_checkpoint(name, &state)
                    .await
                    .map_err(RecoveryError::StateStore)?;
                Ok(merge_restored(restored, result, &submission_order))
            }
            Err(e) => {
                // Save whatever we know before surfacing the failure, so the
                // next run can still resume.
                if let Err(save_error) = store.save_checkpoint(name, &state).await {
                    warn!(checkpoint = name, error = %save_error, "Failed to save checkpoint after exhaustion");
                }
                match e {
                    RecoveryError::RetryExhausted { last_error, .. } => {
                        Err(RecoveryError::CheckpointRecoveryFailed {
                            checkpoint: name.to_string(),
                            wave_number: state.wave_number,
                            last_error,
                        }
                        .into())
                    }
                    other => Err(other.into()),
                }
            }
        }
    }
}

/// Result entry for a task restored from checkpoint state.
fn restored_result(state: &WaveState, task_id: &str) -> Option<TaskResult> {
    if state.completed_tasks.iter().any(|id| id == task_id) {
        Some(TaskResult::succeeded(
            task_id,
            AgentResponse::summary_only("Restored from checkpoint"),
        ))
    } else if state.failed_tasks.iter().any(|id| id == task_id) {
        Some(TaskResult::failed(task_id, "Previously failed"))
    } else {
        None
    }
}

/// Rebuild a `WaveResult` from checkpoint state alone, in submission order.
fn reconstruct_from_state(state: &WaveState, submission_order: &[String]) -> WaveResult {
    let mut tasks: Vec<TaskResult> = submission_order
        .iter()
        .filter_map(|id| restored_result(state, id))
        .collect();
    // Ids recorded in the checkpoint but absent from this submission still
    // belong to the run.
    for id in state.completed_tasks.iter().chain(&state.failed_tasks) {
        if !submission_order.contains(id) {
            if let Some(result) = restored_result(state, id) {
                tasks.push(result);
            }
        }
    }
    let waves = vec![WaveSummary::from_results(1, &tasks)];
    let total_success = tasks.iter().filter(|t| t.success).count();
    let total_failure = tasks.len() - total_success;
    WaveResult {
        tasks,
        waves,
        total_success,
        total_failure,
    }
}

/// Merge restored results with a fresh run, preserving submission order and
/// keeping summary arithmetic consistent.
fn merge_restored(
    restored: Vec<TaskResult>,
    fresh: WaveResult,
    submission_order: &[String],
) -> WaveResult {
    if restored.is_empty() {
        return fresh;
    }

    let mut waves = Vec::with_capacity(fresh.waves.len() + 1);
    waves.push(WaveSummary::from_results(1, &restored));
    for summary in fresh.waves {
        waves.push(WaveSummary {
            wave_number: summary.wave_number + 1,
            ..summary
        });
    }

    let position = |id: &str| {
        submission_order
            .iter()
            .position(|t| t == id)
            .unwrap_or(usize::MAX)
    };
    let mut tasks: Vec<TaskResult> = restored.into_iter().chain(fresh.tasks).collect();
    tasks.sort_by_key(|t| position(&t.id));

    let total_success = tasks.iter().filter(|t| t.success).count();
    let total_failure = tasks.len() - total_success;
    WaveResult {
        tasks,
        waves,
        total_success,
        total_failure,
    }
}
