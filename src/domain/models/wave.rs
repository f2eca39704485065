//! Wave-level models: options, summaries, results, and the checkpoint payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskResult;

/// Options controlling one `execute_wave` run.
///
/// Every field has a documented default; construct with `Default` and
/// override what you need.
#[derive(Debug, Clone)]
pub struct WaveOptions {
    /// Overrides the computed wave size when set (must be >= 1)
    pub wave_size: Option<usize>,

    /// When false (default), the first task failure terminates the run;
    /// already-produced results are preserved in the returned `WaveResult`
    pub continue_on_error: bool,

    /// Whether memory-budget utilization scales the computed wave size
    pub use_memory_budgets: bool,

    /// Goal string written into the GLOBAL memory scope
    pub memory_goal: String,
}

impl Default for WaveOptions {
    fn default() -> Self {
        Self {
            wave_size: None,
            continue_on_error: false,
            use_memory_budgets: true,
            memory_goal: "Wave execution".to_string(),
        }
    }
}

/// Per-wave counters. `success_count + failure_count == task_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveSummary {
    /// 1-based wave number
    pub wave_number: usize,
    pub task_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl WaveSummary {
    /// Derive a summary from the results of one wave.
    pub fn from_results(wave_number: usize, results: &[TaskResult]) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            wave_number,
            task_count: results.len(),
            success_count,
            failure_count: results.len() - success_count,
        }
    }
}

/// Aggregate outcome of a wave run.
///
/// `tasks` holds one result per attempted task, in input order; totals equal
/// the sums over `tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveResult {
    pub tasks: Vec<TaskResult>,
    pub waves: Vec<WaveSummary>,
    pub total_success: usize,
    pub total_failure: usize,
}

impl WaveResult {
    /// Build a result from per-wave task results, computing summaries and totals.
    pub fn from_waves(waves: Vec<Vec<TaskResult>>) -> Self {
        let summaries: Vec<WaveSummary> = waves
            .iter()
            .enumerate()
            .map(|(i, results)| WaveSummary::from_results(i + 1, results))
            .collect();
        let tasks: Vec<TaskResult> = waves.into_iter().flatten().collect();
        let total_success = tasks.iter().filter(|t| t.success).count();
        let total_failure = tasks.len() - total_success;
        Self {
            tasks,
            waves: summaries,
            total_success,
            total_failure,
        }
    }

    /// An empty result (no tasks attempted).
    pub fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            waves: Vec::new(),
            total_success: 0,
            total_failure: 0,
        }
    }
}

/// Durable checkpoint payload for a named run.
///
/// Wire representation is JSON with camelCase keys and an RFC-3339 UTC
/// timestamp. `completed_tasks` and `failed_tasks` are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveState {
    pub wave_number: u32,
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl WaveState {
    /// Create an empty state for a fresh run.
    pub fn new(wave_number: u32) -> Self {
        Self {
            wave_number,
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// True when the given task id is recorded as completed or failed.
    pub fn contains(&self, task_id: &str) -> bool {
        self.completed_tasks.iter().any(|t| t == task_id)
            || self.failed_tasks.iter().any(|t| t == task_id)
    }

    /// Merge the ids from a batch of results, keeping the sets disjoint.
    ///
    /// A task that previously failed and now succeeded moves to
    /// `completed_tasks`; duplicates are not recorded twice.
    pub fn absorb(&mut self, results: &[TaskResult]) {
        for result in results {
            self.failed_tasks.retain(|id| id != &result.id);
            self.completed_tasks.retain(|id| id != &result.id);
            if result.success {
                self.completed_tasks.push(result.id.clone());
            } else {
                self.failed_tasks.push(result.id.clone());
            }
        }
        self.timestamp = Utc::now();
    }
}
