//! Drift detection and determinism classification.
//!
//! Wraps the reproducibility test with thresholds, a confidence score, and
//! a TTL cache keyed by task id and run count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::reproducibility::{ReproducibilityConfig, ReproducibilityReport, ReproducibilityTest};
use crate::domain::models::{DriftConfig, Task};
use crate::domain::ports::TaskExecutor;

/// Determinism thresholds.
#[derive(Debug, Clone)]
pub struct DriftThresholds {
    /// Drift rate (percent) at or below which a task is deterministic
    pub max_drift_rate: f64,
    /// Minimum acceptable reproducibility rate
    pub min_reproducibility: f64,
    /// Minimum acceptable confidence
    pub min_confidence: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            max_drift_rate: 10.0,
            min_reproducibility: 0.8,
            min_confidence: 0.5,
        }
    }
}

/// Narrative portion of a measurement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftAnalysis {
    pub drift_sources: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_output: Option<String>,
    pub consensus_agreement: f64,
}

/// Determinism measurement for one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftMeasurement {
    pub task_id: String,
    pub runs: usize,
    pub drift_rate: f64,
    pub unique_variants: usize,
    pub is_deterministic: bool,
    /// `0.3·min(successful/10, 1) + 0.3·success_ratio + 0.4·reproducibility`
    pub confidence: f64,
    pub analysis: DriftAnalysis,
}

struct CacheEntry {
    stored_at: Instant,
    measurement: DriftMeasurement,
}

/// Measures and classifies task determinism.
pub struct DriftDetector {
    test: ReproducibilityTest,
    thresholds: DriftThresholds,
    default_runs: usize,
    cache_ttl: Duration,
    cache: RwLock<HashMap<(String, usize), CacheEntry>>,
}

impl DriftDetector {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            test: ReproducibilityTest::new(executor, ReproducibilityConfig::default()),
            thresholds: DriftThresholds::default(),
            default_runs: 5,
            cache_ttl: Duration::from_secs(300),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build from the engine configuration.
    pub fn from_config(executor: Arc<dyn TaskExecutor>, config: &DriftConfig) -> Self {
        Self {
            test: ReproducibilityTest::new(
                executor,
                ReproducibilityConfig {
                    runs: config.default_runs,
                    run_timeout: Duration::from_secs(config.run_timeout_secs),
                    parallel: config.max_parallel > 1,
                    max_parallel: config.max_parallel,
                    inter_run_delay: Duration::from_millis(config.inter_run_delay_ms),
                },
            ),
            thresholds: DriftThresholds {
                max_drift_rate: config.max_drift_rate,
                min_reproducibility: config.min_reproducibility,
                min_confidence: config.min_confidence,
            },
            default_runs: config.default_runs,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_thresholds(mut self, thresholds: DriftThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    /// Measure the drift rate over `runs` executions (engine default when
    /// omitted). Results are cached per (task id, runs) until the TTL
    /// expires.
    pub async fn measure_drift_rate(&self, task: &Task, runs: Option<usize>) -> DriftMeasurement {
        let runs = runs.unwrap_or(self.default_runs);
        let key = (task.id.clone(), runs);

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.stored_at.elapsed() < self.cache_ttl {
                    debug!(task_id = %task.id, runs, "Drift measurement served from cache");
                    return entry.measurement.clone();
                }
            }
        }

        let report = self.test.run_test_with(task, runs).await;
        let measurement = self.classify(task, runs, &report);

        let mut cache = self.cache.write().await;
        cache.retain(|_, entry| entry.stored_at.elapsed() < self.cache_ttl);
        cache.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                measurement: measurement.clone(),
            },
        );
        measurement
    }

    /// Threshold checks composed into a violation list; empty means the
    /// task validates as deterministic.
    pub async fn validate_determinism(&self, task: &Task, runs: Option<usize>) -> Vec<String> {
        let measurement = self.measure_drift_rate(task, runs).await;
        let mut violations = Vec::new();
        if measurement.drift_rate > self.thresholds.max_drift_rate {
            violations.push(format!(
                "drift rate {:.2}% exceeds the maximum {:.2}%",
                measurement.drift_rate, self.thresholds.max_drift_rate
            ));
        }
        let reproducibility = measurement.analysis.consensus_agreement;
        if reproducibility < self.thresholds.min_reproducibility {
            violations.push(format!(
                "reproducibility rate {:.2} is below the minimum {:.2}",
                reproducibility, self.thresholds.min_reproducibility
            ));
        }
        if measurement.confidence < self.thresholds.min_confidence {
            violations.push(format!(
                "confidence {:.2} is below the minimum {:.2}",
                measurement.confidence, self.thresholds.min_confidence
            ));
        }
        violations
    }

    /// Drop all cached measurements.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    fn classify(
        &self,
        task: &Task,
        runs: usize,
        report: &ReproducibilityReport,
    ) -> DriftMeasurement {
        let total_runs = report.runs.len().max(1);
        let successful = report.successful_runs as f64;
        let confidence = 0.3 * (successful / 10.0).min(1.0)
            + 0.3 * (successful / total_runs as f64)
            + 0.4 * report.reproducibility_rate;

        let is_deterministic =
            report.successful_runs > 0 && report.drift_rate <= self.thresholds.max_drift_rate;

        DriftMeasurement {
            task_id: task.id.clone(),
            runs,
            drift_rate: report.drift_rate,
            unique_variants: report.unique_variants,
            is_deterministic,
            confidence,
            analysis: DriftAnalysis {
                drift_sources: report
                    .difference_categories
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
                recommendations: report.suggestions.clone(),
                consensus_output: report.consensus_output.clone(),
                consensus_agreement: report.consensus_agreement,
            },
        }
    }
}
