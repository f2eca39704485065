//! N-run reproducibility measurement.
//!
//! Executes a task repeatedly through the `TaskExecutor` port, clusters the
//! successful outputs, and categorizes the differences between variants.
//! A run that errors or times out is a failed run, never a drift variant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::comparator::Comparator;
use super::normalizer::Normalizer;
use crate::domain::models::Task;
use crate::domain::ports::TaskExecutor;

/// Categories of differences between output variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceCategory {
    Timestamp,
    UniqueId,
    ImportOrder,
    Whitespace,
    Comment,
    StringLiteral,
    VariableNaming,
    FunctionVariation,
}

impl DifferenceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::UniqueId => "unique_id",
            Self::ImportOrder => "import_order",
            Self::Whitespace => "whitespace",
            Self::Comment => "comment",
            Self::StringLiteral => "string_literal",
            Self::VariableNaming => "variable_naming",
            Self::FunctionVariation => "function_variation",
        }
    }

    /// Remediation suggestion for outputs drifting in this category.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timestamp => "Freeze or inject clocks so generated timestamps are stable",
            Self::UniqueId => "Seed or mock identifier generation (UUIDs, random ids)",
            Self::ImportOrder => "Canonicalize import ordering before emitting code",
            Self::Whitespace => "Run a formatter so whitespace is deterministic",
            Self::Comment => "Strip or pin generated comments",
            Self::StringLiteral => "Pin string templates that embed run-specific values",
            Self::VariableNaming => {
                "Seed or mock the name generator so variable naming is stable across runs"
            }
            Self::FunctionVariation => {
                "Seed or mock the generator that derives function signatures so naming is stable"
            }
        }
    }
}

/// One executor run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// 0-based run index
    pub run: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
}

/// Test configuration.
#[derive(Debug, Clone)]
pub struct ReproducibilityConfig {
    /// Runs per test
    pub runs: usize,
    /// Per-run timeout
    pub run_timeout: Duration,
    /// Execute runs in capped parallel batches instead of sequentially
    pub parallel: bool,
    /// Batch cap when parallel
    pub max_parallel: usize,
    /// Delay between sequential runs
    pub inter_run_delay: Duration,
}

impl Default for ReproducibilityConfig {
    fn default() -> Self {
        Self {
            runs: 5,
            run_timeout: Duration::from_secs(60),
            parallel: false,
            max_parallel: 4,
            inter_run_delay: Duration::ZERO,
        }
    }
}

/// Aggregated reproducibility report for one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReproducibilityReport {
    pub task_id: String,
    pub runs: Vec<RunRecord>,
    pub successful_runs: usize,
    pub failed_runs: usize,
    /// Majority-cluster agreement among successful runs, 0 with none
    pub reproducibility_rate: f64,
    /// Percent, `(unique_variants - 1) / successful_runs * 100`; 100 with
    /// no successful runs
    pub drift_rate: f64,
    /// Distinct equivalence classes; 0 with no successful runs
    pub unique_variants: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_output: Option<String>,
    pub consensus_agreement: f64,
    pub mean_duration_ms: f64,
    pub duration_variance_ms: f64,
    pub difference_categories: Vec<DifferenceCategory>,
    pub suggestions: Vec<String>,
}

/// Measures output stability over repeated executions.
pub struct ReproducibilityTest {
    executor: Arc<dyn TaskExecutor>,
    comparator: Comparator,
    normalizer: Normalizer,
    config: ReproducibilityConfig,
    patterns: DifferencePatterns,
}

struct DifferencePatterns {
    timestamp: Regex,
    unique_id: Regex,
    comment: Regex,
    quoted: Regex,
    function_def: Regex,
    word: Regex,
}

impl DifferencePatterns {
    fn new() -> Self {
        let compile = |name: &str, pattern: &str| {
            Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid {name} difference pattern: {e}"))
        };
        Self {
            // Epoch arms are exactly seconds (10) or millis (13) so hex-ish
            // id segments do not classify as timestamps
            timestamp: compile(
                "timestamp",
                r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2})?|\b(\d{10}|\d{13})\b",
            ),
            unique_id: compile(
                "unique-id",
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
            ),
            comment: compile("comment", r"^\s*(//|#|/\*)"),
            quoted: compile("quoted", r#""[^"]*"|'[^']*'"#),
            function_def: compile("function-def", r"\b(fn|function|def)\b"),
            word: compile("word", r"[A-Za-z_][A-Za-z0-9_]*"),
        }
    }
}

impl ReproducibilityTest {
    pub fn new(executor: Arc<dyn TaskExecutor>, config: ReproducibilityConfig) -> Self {
        Self {
            executor,
            comparator: Comparator::default(),
            normalizer: Normalizer::default(),
            config,
            patterns: DifferencePatterns::new(),
        }
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Run the configured number of executions and aggregate.
    pub async fn run_test(&self, task: &Task) -> ReproducibilityReport {
        self.run_test_with(task, self.config.runs).await
    }

    /// Run an explicit number of executions and aggregate.
    pub async fn run_test_with(&self, task: &Task, runs: usize) -> ReproducibilityReport {
        let records = if self.config.parallel {
            self.execute_parallel(task, runs).await
        } else {
            self.execute_sequential(task, runs).await
        };
        self.aggregate(task, records)
    }

    async fn execute_sequential(&self, task: &Task, runs: usize) -> Vec<RunRecord> {
        let mut records = Vec::with_capacity(runs);
        for run in 0..runs {
            records.push(self.execute_once(task, run).await);
            if run + 1 < runs && !self.config.inter_run_delay.is_zero() {
                sleep(self.config.inter_run_delay).await;
            }
        }
        records
    }

    async fn execute_parallel(&self, task: &Task, runs: usize) -> Vec<RunRecord> {
        let mut records = Vec::with_capacity(runs);
        let cap = self.config.max_parallel.max(1);
        let mut next = 0usize;
        while next < runs {
            let batch_end = (next + cap).min(runs);
            let batch = join_all((next..batch_end).map(|run| self.execute_once(task, run))).await;
            records.extend(batch);
            next = batch_end;
        }
        records
    }

    async fn execute_once(&self, task: &Task, run: usize) -> RunRecord {
        let started = Instant::now();
        let outcome = timeout(self.config.run_timeout, self.executor.execute(task)).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
        match outcome {
            Err(_) => {
                warn!(task_id = %task.id, run, "Execution timeout");
                RunRecord {
                    run,
                    success: false,
                    output: None,
                    error: Some("Execution timeout".to_string()),
                    duration_ms,
                }
            }
            Ok(Err(e)) => RunRecord {
                run,
                success: false,
                output: None,
                error: Some(e.to_string()),
                duration_ms,
            },
            Ok(Ok(output)) if !output.success => RunRecord {
                run,
                success: false,
                output: None,
                error: Some(
                    output
                        .error
                        .unwrap_or_else(|| "executor reported failure".to_string()),
                ),
                duration_ms,
            },
            Ok(Ok(output)) => RunRecord {
                run,
                success: true,
                output: Some(output.output),
                error: None,
                duration_ms,
            },
        }
    }

    fn aggregate(&self, task: &Task, records: Vec<RunRecord>) -> ReproducibilityReport {
        let successful_outputs: Vec<String> = records
            .iter()
            .filter_map(|r| r.output.clone())
            .collect();
        let successful_runs = successful_outputs.len();
        let failed_runs = records.len() - successful_runs;

        let durations: Vec<f64> = records.iter().map(|r| r.duration_ms).collect();
        let mean_duration_ms = mean(&durations);
        let duration_variance_ms = variance(&durations, mean_duration_ms);

        if successful_runs == 0 {
            return ReproducibilityReport {
                task_id: task.id.clone(),
                runs: records,
                successful_runs: 0,
                failed_runs,
                reproducibility_rate: 0.0,
                drift_rate: 100.0,
                unique_variants: 0,
                consensus_output: None,
                consensus_agreement: 0.0,
                mean_duration_ms,
                duration_variance_ms,
                difference_categories: Vec::new(),
                suggestions: Vec::new(),
            };
        }

        let consensus = self.comparator.find_consensus(&successful_outputs);
        let drift = self.comparator.calculate_drift(&successful_outputs);
        let (consensus_output, consensus_agreement) = consensus
            .map(|c| (Some(c.output), c.agreement_rate))
            .unwrap_or((None, 0.0));

        let difference_categories = self.categorize(&successful_outputs);
        let mut suggestions: Vec<String> = difference_categories
            .iter()
            .map(|c| c.suggestion().to_string())
            .collect();
        suggestions.dedup();

        debug!(
            task_id = %task.id,
            successful_runs,
            failed_runs,
            unique_variants = drift.unique_variants,
            drift_rate = drift.drift_rate,
            "Reproducibility test aggregated"
        );

        ReproducibilityReport {
            task_id: task.id.clone(),
            runs: records,
            successful_runs,
            failed_runs,
            reproducibility_rate: consensus_agreement,
            drift_rate: drift.drift_rate,
            unique_variants: drift.unique_variants,
            consensus_output,
            consensus_agreement,
            mean_duration_ms,
            duration_variance_ms,
            difference_categories,
            suggestions,
        }
    }

    /// Categorize the differences between the first output and every other
    /// variant, by line pairs.
    fn categorize(&self, outputs: &[String]) -> Vec<DifferenceCategory> {
        let mut categories = Vec::new();
        let Some(reference) = outputs.first() else {
            return categories;
        };
        for other in &outputs[1..] {
            for (left, right) in differing_line_pairs(reference, other) {
                if let Some(category) = self.classify_pair(&left, &right) {
                    if !categories.contains(&category) {
                        categories.push(category);
                    }
                }
            }
        }
        categories
    }

    fn classify_pair(&self, left: &str, right: &str) -> Option<DifferenceCategory> {
        let patterns = &self.patterns;
        if patterns.timestamp.is_match(left) || patterns.timestamp.is_match(right) {
            return Some(DifferenceCategory::Timestamp);
        }
        if patterns.unique_id.is_match(left) || patterns.unique_id.is_match(right) {
            return Some(DifferenceCategory::UniqueId);
        }
        if self.normalizer.is_import_line(left) && self.normalizer.is_import_line(right) {
            return Some(DifferenceCategory::ImportOrder);
        }
        if left.split_whitespace().eq(right.split_whitespace()) {
            return Some(DifferenceCategory::Whitespace);
        }
        if patterns.comment.is_match(left) || patterns.comment.is_match(right) {
            return Some(DifferenceCategory::Comment);
        }
        if patterns.quoted.replace_all(left, "\"\"")
            == patterns.quoted.replace_all(right, "\"\"")
        {
            return Some(DifferenceCategory::StringLiteral);
        }
        // Identifier-only differences: line shapes match once words are masked
        if patterns.word.replace_all(left, "_") == patterns.word.replace_all(right, "_") {
            if patterns.function_def.is_match(left) || patterns.function_def.is_match(right) {
                return Some(DifferenceCategory::FunctionVariation);
            }
            return Some(DifferenceCategory::VariableNaming);
        }
        None
    }
}

fn differing_line_pairs(a: &str, b: &str) -> Vec<(String, String)> {
    let lines_a: Vec<&str> = a.lines().collect();
    let lines_b: Vec<&str> = b.lines().collect();
    let mut pairs = Vec::new();
    for index in 0..lines_a.len().max(lines_b.len()) {
        let left = lines_a.get(index).copied().unwrap_or("");
        let right = lines_b.get(index).copied().unwrap_or("");
        if left != right {
            pairs.push((left.to_string(), right.to_string()));
        }
    }
    pairs
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }
}
