//! Circuit breaker pattern for failure detection and recovery.
//!
//! Implements per-service circuit breakers that halt calls to a failing
//! service after a run of consecutive failures, preventing cascade failures.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Configuration for circuit breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration to keep circuit open before trying half-open.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::milliseconds(60_000),
        }
    }
}

impl From<&crate::domain::models::config::CircuitBreakerConfig> for CircuitBreakerConfig {
    fn from(config: &crate::domain::models::config::CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cooldown: Duration::milliseconds(config.cooldown_ms as i64),
        }
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are blocked.
    Open,
    /// Circuit is testing if the service has recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Individual circuit breaker state for one service key.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures observed while closed.
    pub failure_count: u32,
    /// When the circuit was opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// When state last changed.
    pub state_changed_at: DateTime<Utc>,
    /// Total times the circuit opened.
    pub open_count: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// Create a new closed circuit breaker.
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            state_changed_at: Utc::now(),
            open_count: 0,
        }
    }

    /// Record a failure.
    pub fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= config.failure_threshold {
                    self.open();
                }
            }
            // Any failure in half-open reopens the circuit
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => self.failure_count += 1,
        }
    }

    /// Record a success.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => self.close(),
            // Failures must be consecutive to trip the circuit
            CircuitState::Closed => self.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    /// Open the circuit.
    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Utc::now());
        self.state_changed_at = Utc::now();
        self.open_count += 1;
    }

    /// Close the circuit.
    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.state_changed_at = Utc::now();
        self.failure_count = 0;
    }

    /// Transition to half-open.
    fn half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.state_changed_at = Utc::now();
    }

    /// Check whether the circuit allows a request at `now`, transitioning
    /// OPEN → HALF_OPEN when the cooldown has elapsed.
    pub fn allows_at(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match self.opened_at {
                Some(opened_at) if now - opened_at >= config.cooldown => {
                    self.half_open();
                    true // Allow one trial request
                }
                _ => false,
            },
        }
    }

    /// Check whether the circuit allows a request right now.
    pub fn allows(&mut self, config: &CircuitBreakerConfig) -> bool {
        self.allows_at(config, Utc::now())
    }

    /// When a blocked caller may retry.
    pub fn retry_after(&self, config: &CircuitBreakerConfig) -> DateTime<Utc> {
        self.opened_at.unwrap_or_else(Utc::now) + config.cooldown
    }

    /// Manually reset the circuit to closed.
    pub fn reset(&mut self) {
        self.close();
        self.open_count = 0;
    }
}

/// Reporting snapshot of one circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub service: String,
    pub state: String,
    pub failure_count: u32,
    pub open_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub state_changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown, Duration::milliseconds(60_000));
    }

    #[test]
    fn test_opens_on_consecutive_failures() {
        let mut circuit = CircuitBreaker::new();
        let config = config(3);

        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(circuit.state, CircuitState::Closed);

        circuit.record_failure(&config);
        assert_eq!(circuit.state, CircuitState::Open);
        assert!(circuit.opened_at.is_some());
        assert_eq!(circuit.open_count, 1);
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let mut circuit = CircuitBreaker::new();
        let config = config(3);

        circuit.record_failure(&config);
        circuit.record_failure(&config);
        circuit.record_success();
        assert_eq!(circuit.failure_count, 0);

        // Two more failures are not enough after the reset
        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert_eq!(circuit.state, CircuitState::Closed);
    }

    #[test]
    fn test_open_circuit_blocks() {
        let mut circuit = CircuitBreaker::new();
        let config = config(2);

        assert!(circuit.allows(&config));
        circuit.record_failure(&config);
        circuit.record_failure(&config);
        assert!(!circuit.allows(&config));
    }

    #[test]
    fn test_cooldown_transitions_to_half_open() {
        let mut circuit = CircuitBreaker::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::seconds(60),
        };

        circuit.record_failure(&config);
        assert_eq!(circuit.state, CircuitState::Open);

        let opened_at = circuit.opened_at.unwrap();
        // Before cooldown: blocked
        assert!(!circuit.allows_at(&config, opened_at + Duration::seconds(30)));
        assert_eq!(circuit.state, CircuitState::Open);

        // After cooldown: one trial allowed, state is half-open
        assert!(circuit.allows_at(&config, opened_at + Duration::seconds(61)));
        assert_eq!(circuit.state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_success_closes_and_resets() {
        let mut circuit = CircuitBreaker::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::seconds(1),
        };

        circuit.record_failure(&config);
        let opened_at = circuit.opened_at.unwrap();
        assert!(circuit.allows_at(&config, opened_at + Duration::seconds(2)));

        circuit.record_success();
        assert_eq!(circuit.state, CircuitState::Closed);
        assert_eq!(circuit.failure_count, 0);
        assert!(circuit.opened_at.is_none());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut circuit = CircuitBreaker::new();
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::seconds(1),
        };

        circuit.record_failure(&config);
        let opened_at = circuit.opened_at.unwrap();
        assert!(circuit.allows_at(&config, opened_at + Duration::seconds(2)));
        assert_eq!(circuit.state, CircuitState::HalfOpen);

        circuit.record_failure(&config);
        assert_eq!(circuit.state, CircuitState::Open);
        assert_eq!(circuit.open_count, 2);
    }

    #[test]
    fn test_reset() {
        let mut circuit = CircuitBreaker::new();
        let config = config(1);

        circuit.record_failure(&config);
        assert_eq!(circuit.state, CircuitState::Open);

        circuit.reset();
        assert_eq!(circuit.state, CircuitState::Closed);
        assert_eq!(circuit.open_count, 0);
        assert_eq!(circuit.failure_count, 0);
    }

    #[test]
    fn test_state_as_str() {
        assert_eq!(CircuitState::Closed.as_str(), "closed");
        assert_eq!(CircuitState::Open.as_str(), "open");
        assert_eq!(CircuitState::HalfOpen.as_str(), "half_open");
    }
}
