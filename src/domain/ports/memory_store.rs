//! Memory store port - hierarchical scoped events and artifacts.
//!
//! The orchestrator threads its lifecycle through nested scopes
//! (GLOBAL → TASK → LOCAL), emitting events and artifacts as it goes.
//! Storage, retention, and budget accounting are the store's concern.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier of an open scope.
pub type ScopeId = Uuid;

/// Nesting level of a scope in the run hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeLevel {
    Global,
    Task,
    Local,
}

/// Request to open a scope.
#[derive(Debug, Clone)]
pub struct ScopeSpec {
    pub goal: String,
    pub level: ScopeLevel,
    pub complexity: Option<u8>,
}

impl ScopeSpec {
    pub fn new(goal: impl Into<String>, level: ScopeLevel) -> Self {
        Self {
            goal: goal.into(),
            level,
            complexity: None,
        }
    }
}

/// One event recorded inside a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl MemoryEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn orchestration_started(data: Value) -> Self {
        Self::new("orchestration_started", data)
    }

    pub fn orchestration_completed(data: Value) -> Self {
        Self::new("orchestration_completed", data)
    }

    pub fn orchestration_failed(data: Value) -> Self {
        Self::new("orchestration_failed", data)
    }

    pub fn wave_start(wave_number: usize) -> Self {
        Self::new(format!("wave_{wave_number}_start"), Value::Null)
    }

    pub fn wave_completed(wave_number: usize, data: Value) -> Self {
        Self::new(format!("wave_{wave_number}_completed"), data)
    }

    pub fn task_start(task_id: &str) -> Self {
        Self::new(format!("task_{task_id}_start"), Value::Null)
    }

    pub fn agent_output(data: Value) -> Self {
        Self::new("AGENT_OUTPUT", data)
    }

    pub fn error(data: Value) -> Self {
        Self::new("ERROR", data)
    }
}

/// Budget utilization percentages reported by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetUtilization {
    /// Task-scope budget utilization, in percent (may exceed 100)
    pub task: f64,
}

/// Point-in-time metrics from the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    pub budget_utilization: BudgetUtilization,
}

/// Trait for hierarchical memory implementations.
///
/// Implementations must be safe for concurrent callers; mutations occur on
/// the caller's task.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Open a scope and return its id.
    async fn create_scope(&self, spec: ScopeSpec) -> Result<ScopeId>;

    /// Record an event inside an open scope.
    async fn add_event(&self, scope: ScopeId, event: MemoryEvent) -> Result<()>;

    /// Attach or replace an artifact on an open scope.
    async fn set_artifact(&self, scope: ScopeId, key: &str, value: Value) -> Result<()>;

    /// Current budget metrics.
    async fn metrics(&self) -> Result<MemoryMetrics>;

    /// Close a scope with a summary line.
    async fn close_scope(&self, scope: ScopeId, summary: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_labels() {
        assert_eq!(MemoryEvent::wave_start(3).event_type, "wave_3_start");
        assert_eq!(MemoryEvent::task_start("a").event_type, "task_a_start");
        assert_eq!(
            MemoryEvent::agent_output(json!({})).event_type,
            "AGENT_OUTPUT"
        );
        assert_eq!(MemoryEvent::error(json!({})).event_type, "ERROR");
    }

    #[test]
    fn test_event_wire_format_uses_type_key() {
        let event = MemoryEvent::orchestration_started(json!({"totalTasks": 3}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "orchestration_started");
        assert!(json["id"].is_string());
        assert_eq!(json["data"]["totalTasks"], 3);
    }
}
