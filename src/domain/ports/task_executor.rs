//! Task executor port - repeated execution for reproducibility testing.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::Task;

/// Output of one executor run.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Trait for executors the reproducibility test drives N times.
///
/// Both an `Err` and a `success = false` output count as a failed run;
/// neither contributes a drift variant.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<ExecutionOutput>;
}
