//! Execution context handed to contract conditions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of the execution being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Idle,
    Planning,
    Executing,
    Verifying,
    Committing,
    Completed,
    Failed,
}

/// Snapshot of one task execution, as seen by contract conditions.
///
/// Inputs, outputs, and artifacts are opaque JSON values; use the typed
/// accessors at the boundary rather than threading `Value` through callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub scope_id: String,
    pub task_id: String,
    pub inputs: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<HashMap<String, Value>>,
    pub state: ExecutionState,
    pub artifacts: HashMap<String, Value>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionContext {
    /// A fresh idle context for a task.
    pub fn new(scope_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            task_id: task_id.into(),
            inputs: HashMap::new(),
            outputs: None,
            state: ExecutionState::Idle,
            artifacts: HashMap::new(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn with_state(mut self, state: ExecutionState) -> Self {
        self.state = state;
        self
    }

    /// Record an output value, creating the output map on first use.
    pub fn set_output(&mut self, key: impl Into<String>, value: Value) {
        self.outputs
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
    }

    pub fn set_artifact(&mut self, key: impl Into<String>, value: Value) {
        self.artifacts.insert(key.into(), value);
    }

    /// Typed accessor: a string input.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }

    /// Typed accessor: a string output.
    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.outputs
            .as_ref()
            .and_then(|outputs| outputs.get(key))
            .and_then(Value::as_str)
    }

    /// Whether any output was recorded under the key.
    pub fn has_output(&self, key: &str) -> bool {
        self.outputs
            .as_ref()
            .is_some_and(|outputs| outputs.contains_key(key))
    }

    /// Mark the execution finished in the given state.
    pub fn finish(&mut self, state: ExecutionState) {
        self.state = state;
        self.end_time = Some(Utc::now());
    }
}
