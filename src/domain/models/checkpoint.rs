//! Step checkpoints and resume decisions.
//!
//! A `StepCheckpoint` is a durable snapshot of one execution step; the
//! resume decision engine classifies it into a `ResumeDecision`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a checkpointed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

/// Structured error captured with a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    /// Human-readable failure message
    pub message: String,

    /// Machine-readable code, when the failing layer provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Whether the failing layer considers the error recoverable
    #[serde(default = "default_recoverable")]
    pub recoverable: bool,
}

const fn default_recoverable() -> bool {
    true
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            recoverable: true,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn unrecoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

/// The step portion of a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStep {
    pub id: String,
    pub status: StepStatus,
    pub attempt_number: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

/// Durable snapshot of one execution step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCheckpoint {
    pub step: CheckpointStep,
    pub created_at: DateTime<Utc>,
}

impl StepCheckpoint {
    pub fn new(step: CheckpointStep) -> Self {
        Self {
            step,
            created_at: Utc::now(),
        }
    }
}

/// Recommended action after classifying a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    Resume,
    Skip,
    Restart,
    Abort,
}

impl ResumeAction {
    /// Weight used when ranking resume points across checkpoints.
    pub const fn weight(self) -> f64 {
        match self {
            Self::Resume => 1.0,
            Self::Skip => 0.8,
            Self::Restart => 0.6,
            Self::Abort => 0.4,
        }
    }
}

/// A lower-confidence alternative to the recommended action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeAlternative {
    pub action: ResumeAction,
    pub reason: String,
    pub confidence: f64,
}

/// Classification of a step checkpoint into an actionable recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDecision {
    pub action: ResumeAction,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_step: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_steps: Vec<String>,
    /// Confidence in the recommendation, clamped to [0, 1]
    pub confidence: f64,
    pub alternatives: Vec<ResumeAlternative>,
}

impl ResumeDecision {
    pub fn new(action: ResumeAction, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            action,
            reason: reason.into(),
            from_step: None,
            skip_steps: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            alternatives: Vec::new(),
        }
    }

    pub fn from_step(mut self, step: impl Into<String>) -> Self {
        self.from_step = Some(step.into());
        self
    }

    pub fn with_alternative(
        mut self,
        action: ResumeAction,
        reason: impl Into<String>,
        confidence: f64,
    ) -> Self {
        self.alternatives.push(ResumeAlternative {
            action,
            reason: reason.into(),
            confidence,
        });
        self
    }
}
