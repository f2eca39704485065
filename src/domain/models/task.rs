//! Task and task-result models for wave execution.

use serde::{Deserialize, Serialize};

/// An opaque unit of work delegated to the agent runner.
///
/// Dependencies reference other task ids within the same submission (or an
/// earlier one); the orchestrator refuses to run a task whose dependencies
/// have not completed successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within a submission
    pub id: String,

    /// Prompt handed to the agent runner
    pub prompt: String,

    /// Ids of tasks that must succeed before this one runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Task {
    /// Create a task with no dependencies.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            dependencies: Vec::new(),
        }
    }

    /// Add dependencies on previously submitted task ids.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Structured agent output produced by the response parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentResponse {
    pub success: bool,
    pub files_modified: Vec<String>,
    pub tests_written: Vec<String>,
    pub summary: String,
    pub errors: Vec<String>,
    pub next_steps: Vec<String>,
}

impl AgentResponse {
    /// A successful response carrying only a summary.
    pub fn summary_only(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one task within a wave.
///
/// Exactly one of `error` / `response` is populated, matching `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the originating task
    pub id: String,

    /// Whether the task completed successfully
    pub success: bool,

    /// Human-readable failure reason (present iff `success` is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Parsed agent response (present iff `success` is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AgentResponse>,

    /// Provider reported by the runner, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,

    /// Model reported by the runner, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl TaskResult {
    /// Build a successful result.
    pub fn succeeded(id: impl Into<String>, response: AgentResponse) -> Self {
        Self {
            id: id.into(),
            success: true,
            error: None,
            response: Some(response),
            provider_used: None,
            model_used: None,
        }
    }

    /// Build a failed result with a human-readable reason.
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            error: Some(error.into()),
            response: None,
            provider_used: None,
            model_used: None,
        }
    }

    /// Attach provider/model attribution reported by the runner.
    pub fn with_attribution(
        mut self,
        provider: Option<String>,
        model: Option<String>,
    ) -> Self {
        self.provider_used = provider;
        self.model_used = model;
        self
    }
}
