//! Domain error types for the Breakwater execution core
//!
//! This module defines all error types using thiserror for structured error
//! handling. Each error enum represents errors from a specific component
//! family. Per-task failures inside a wave are data (`TaskResult.error`),
//! never errors; only unexpected collaborator failures and fault-tolerance
//! terminal states surface as these types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the recovery engine (retry, circuit breaker, checkpoint).
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The retry options failed validation before any attempt was made
    #[error("Invalid retry options: {0}")]
    InvalidRetryOptions(String),

    /// Every retry attempt failed; carries the last underlying error
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: anyhow::Error,
    },

    /// The circuit for this service is open and rejecting calls
    #[error("Circuit open for service '{service}', retry after {retry_after}")]
    CircuitOpen {
        service: String,
        opened_at: DateTime<Utc>,
        retry_after: DateTime<Utc>,
    },

    /// Checkpoint-resumable execution exhausted its retries; the latest
    /// state was saved under `checkpoint` before this was raised
    #[error("Checkpoint recovery failed for '{checkpoint}' (wave {wave_number}): {last_error}")]
    CheckpointRecoveryFailed {
        checkpoint: String,
        wave_number: u32,
        last_error: anyhow::Error,
    },

    /// The state store failed while loading or saving a checkpoint
    #[error("State store operation failed: {0}")]
    StateStore(anyhow::Error),

    /// The operation was cancelled via the shutdown signal
    #[error("Operation cancelled")]
    Cancelled,
}

impl RecoveryError {
    /// Returns true if the operation could succeed if attempted again later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::StateStore(_))
    }

    /// Returns true if retrying the same call cannot help
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidRetryOptions(_) | Self::RetryExhausted { .. }
        )
    }
}

/// Errors raised by the condition evaluator for malformed conditions.
///
/// Runtime condition violations (a failing command, a missing reference)
/// are evaluation results, not errors; only structurally invalid conditions
/// raise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The condition cannot be evaluated as constructed
    #[error("Invalid condition '{name}': {reason}")]
    InvalidCondition { name: String, reason: String },
}

impl ConditionError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCondition {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the contract registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A contract with this id is already registered
    #[error("Contract already registered: {0}")]
    DuplicateContract(String),

    /// No contract with this id exists
    #[error("Contract not found: {0}")]
    NotFound(String),
}

/// Errors raised by the wave orchestrator for non-task failures.
///
/// Individual task failures are captured in `TaskResult`; these variants
/// cover bookkeeping and collaborator failures that abort the run.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// The memory store failed during scope or event bookkeeping
    #[error("Memory store operation failed: {0}")]
    MemoryStore(anyhow::Error),

    /// The run was cancelled via the shutdown signal
    #[error("Orchestration cancelled at wave {wave_number}")]
    Cancelled { wave_number: usize },
}
