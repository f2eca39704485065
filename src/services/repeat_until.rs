//! Bounded repeat-until loops with exit-condition evaluation.
//!
//! Drives a caller-supplied async body until an exit condition is satisfied
//! or the iteration bound is reached. Checkpointing and drift measurement
//! are the caller's concern; the driver owns iteration counting, per-
//! iteration timeouts, inter-iteration delays, and graceful shutdown.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use super::condition_evaluator::ConditionEvaluator;
use crate::domain::models::{ConditionEvaluationResult, ExitCondition, LoopContext};

/// Loop driver configuration.
#[derive(Debug, Clone)]
pub struct RepeatUntilConfig {
    /// Iteration bound (safety limit)
    pub max_iterations: u32,

    /// Delay between iterations
    pub iteration_delay: Duration,

    /// Per-iteration timeout for the loop body, when set
    pub iteration_timeout: Option<Duration>,
}

impl Default for RepeatUntilConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            iteration_delay: Duration::ZERO,
            iteration_timeout: None,
        }
    }
}

/// Outcome of a bounded loop.
#[derive(Debug)]
pub struct RepeatOutcome {
    /// Whether the exit condition was satisfied before the bound
    pub satisfied: bool,

    /// Iterations actually run
    pub iterations: u32,

    /// Final loop context, including step outputs
    pub context: LoopContext,

    /// Per-iteration condition evaluations, in order
    pub history: Vec<ConditionEvaluationResult>,
}

/// Bounded loop driver.
pub struct RepeatUntil {
    evaluator: ConditionEvaluator,
    config: RepeatUntilConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for RepeatUntil {
    fn default() -> Self {
        Self::new(RepeatUntilConfig::default())
    }
}

impl RepeatUntil {
    pub fn new(config: RepeatUntilConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            evaluator: ConditionEvaluator::new(),
            config,
            shutdown_tx,
        }
    }

    /// Handle for cancelling the loop between iterations.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run `body` until `condition` is satisfied or the bound is reached.
    ///
    /// The body receives the loop context by value and returns the updated
    /// context; the condition is evaluated after every iteration. Body
    /// errors and per-iteration timeouts propagate to the caller.
    pub async fn run<F, Fut>(
        &self,
        mut ctx: LoopContext,
        mut body: F,
        condition: &ExitCondition,
    ) -> Result<RepeatOutcome>
    where
        F: FnMut(LoopContext) -> Fut,
        Fut: Future<Output = Result<LoopContext>>,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut history = Vec::new();

        for iteration in 0..self.config.max_iterations {
            ctx.iteration = iteration;
            debug!(iteration, "Running loop body");

            ctx = match self.config.iteration_timeout {
                Some(limit) => timeout(limit, body(ctx))
                    .await
                    .map_err(|_| anyhow::anyhow!("Iteration {iteration} timed out"))?
                    .context("loop body failed")?,
                None => body(ctx).await.context("loop body failed")?,
            };

            let evaluation = self.evaluator.evaluate(condition, &ctx).await?;
            let satisfied = evaluation.satisfied;
            history.push(evaluation);

            if satisfied {
                info!(iterations = iteration + 1, "Exit condition satisfied");
                return Ok(RepeatOutcome {
                    satisfied: true,
                    iterations: iteration + 1,
                    context: ctx,
                    history,
                });
            }

            if iteration + 1 < self.config.max_iterations
                && !self.config.iteration_delay.is_zero()
            {
                tokio::select! {
                    () = sleep(self.config.iteration_delay) => {}
                    _ = shutdown_rx.recv() => {
                        info!(iteration, "Loop cancelled between iterations");
                        return Ok(RepeatOutcome {
                            satisfied: false,
                            iterations: iteration + 1,
                            context: ctx,
                            history,
                        });
                    }
                }
            }
        }

        info!(
            max_iterations = self.config.max_iterations,
            "Iteration bound reached without satisfying the exit condition"
        );
        Ok(RepeatOutcome {
            satisfied: false,
            iterations: self.config.max_iterations,
            context: ctx,
            history,
        })
    }
}
