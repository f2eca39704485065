//! Engine configuration records.
//!
//! Loaded through the figment-based `ConfigLoader` with hierarchical
//! merging; every field has a programmatic default so a missing config file
//! is never an error.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum concurrent agent slots
    pub max_concurrent: usize,

    pub wave: WaveConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub drift: DriftConfig,
    pub checkpoint: CheckpointConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            wave: WaveConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            drift: DriftConfig::default(),
            checkpoint: CheckpointConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Wave scheduling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Interval between agent-slot polls, in milliseconds
    pub slot_poll_interval_ms: u64,

    /// Slot polls before a task fails with a resource-limit error
    pub slot_max_attempts: u32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            slot_poll_interval_ms: 100,
            slot_max_attempts: 10,
        }
    }
}

/// Exponential-backoff retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Per-service circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// How long the circuit stays open before a half-open trial, in ms
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

/// Drift detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Runs per reproducibility test when the caller does not override
    pub default_runs: usize,

    /// Drift rate (percent) at or below which a task is deterministic
    pub max_drift_rate: f64,

    /// Minimum acceptable reproducibility rate for determinism validation
    pub min_reproducibility: f64,

    /// Minimum acceptable confidence for determinism validation
    pub min_confidence: f64,

    /// Per-run timeout, in seconds
    pub run_timeout_secs: u64,

    /// Cap on concurrent runs when executing batched-parallel
    pub max_parallel: usize,

    /// Delay between sequential runs, in milliseconds
    pub inter_run_delay_ms: u64,

    /// Measurement cache time-to-live, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            default_runs: 5,
            max_drift_rate: 10.0,
            min_reproducibility: 0.8,
            min_confidence: 0.5,
            run_timeout_secs: 60,
            max_parallel: 4,
            inter_run_delay_ms: 0,
            cache_ttl_secs: 300,
        }
    }
}

/// Checkpoint storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory for JSON checkpoint files
    pub dir: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: ".breakwater/checkpoints".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error
    pub level: String,

    /// One of: json, pretty
    pub format: String,

    /// When set, logs also go to rolling files under this directory
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.wave.slot_poll_interval_ms, 100);
        assert_eq!(config.wave.slot_max_attempts, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.cooldown_ms, 60_000);
        assert!((config.drift.max_drift_rate - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.checkpoint.dir, ".breakwater/checkpoints");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r"
max_concurrent: 4
retry:
  max_attempts: 5
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.retry.max_attempts, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }
}
