//! Breakwater - Batched Agent Execution Core
//!
//! A single-process execution core for batched agent work:
//! - Wave scheduler with dependency gating and concurrency budgets
//! - Retry / circuit-breaker fault tolerance with checkpoint recovery
//! - Resume decision engine for classified failure handling
//! - Exit-condition evaluator for bounded loops
//! - Contract verification (preconditions / postconditions / invariants)
//! - Drift detection (normalization, semantic comparison, reproducibility)
//!
//! External collaborators (agent runner, prompt validator, response parser,
//! memory store, state store, task executor) are ports in [`domain::ports`];
//! the [`infrastructure`] module ships file-backed, in-memory, and mock
//! implementations for local use and testing.

pub mod cli;
pub mod domain;
pub mod drift;
pub mod infrastructure;
pub mod services;
pub mod verification;

// Re-export key types for convenience
pub use domain::error::{ConditionError, RecoveryError, RegistryError};
pub use domain::models::{
    Config, Task, TaskResult, WaveOptions, WaveResult, WaveState, WaveSummary,
};
pub use services::{
    ConditionEvaluator, RecoveryEngine, ResourceManager, ResumeDecisionEngine, RetryOptions,
    WaveOrchestrator,
};
