//! Resume decision engine.
//!
//! Classifies a step checkpoint into a recommended action by pattern-matching
//! the recorded error against an ordered table of failure categories. The
//! table and its ordering are stable; patterns are compiled once at
//! construction and evaluated in order, first match wins.

use chrono::{Duration, Utc};
use regex::Regex;
use tracing::debug;

use crate::domain::models::{
    ResumeAction, ResumeDecision, StepCheckpoint, StepError, StepStatus,
};

/// Score multiplier for checkpoints created within the last hour.
const RECENCY_BOOST: f64 = 1.1;

struct ErrorPattern {
    category: &'static str,
    pattern: Regex,
    action: ResumeAction,
    confidence: f64,
}

/// Classifies step checkpoints into resume decisions.
pub struct ResumeDecisionEngine {
    patterns: Vec<ErrorPattern>,
}

impl Default for ResumeDecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeDecisionEngine {
    /// Build the engine, compiling the error-pattern table.
    ///
    /// Ordering matters: an ETIMEDOUT message classifies as `network`, not
    /// `timeout`, because the network row comes first.
    pub fn new() -> Self {
        let table: [(&'static str, &'static str, ResumeAction, f64); 10] = [
            (
                "network",
                r"(?i)ECONNREFUSED|ECONNRESET|ENOTFOUND|ETIMEDOUT|EHOSTUNREACH|socket hang up|network",
                ResumeAction::Resume,
                0.85,
            ),
            (
                "rate_limit",
                r"(?i)rate.?limit|too many requests|429",
                ResumeAction::Resume,
                0.8,
            ),
            (
                "timeout",
                r"(?i)timed?.?out|deadline exceeded",
                ResumeAction::Resume,
                0.75,
            ),
            (
                "type_error",
                r"(?i)TypeError|type mismatch|mismatched types|is not a function",
                ResumeAction::Restart,
                0.6,
            ),
            (
                "reference_error",
                r"(?i)ReferenceError|is not defined|cannot find (value|name|symbol)|undefined variable",
                ResumeAction::Restart,
                0.6,
            ),
            (
                "syntax_error",
                r"(?i)SyntaxError|unexpected token|parse error|unexpected end of (input|file)",
                ResumeAction::Restart,
                0.55,
            ),
            (
                "test_failure",
                r"(?i)tests? failed|assertions? failed|expected .+ (but|got)",
                ResumeAction::Resume,
                0.65,
            ),
            (
                "build_error",
                r"(?i)build failed|compilation (error|failed)|cannot compile|compile error",
                ResumeAction::Restart,
                0.6,
            ),
            (
                "resource_exhausted",
                r"(?i)out of memory|ENOMEM|ENOSPC|no space left|heap limit|resource exhaust|quota exceeded",
                ResumeAction::Skip,
                0.6,
            ),
            (
                "permission_error",
                r"(?i)EACCES|EPERM|permission denied|access denied|forbidden|403",
                ResumeAction::Abort,
                0.75,
            ),
        ];

        let patterns = table
            .into_iter()
            .map(|(category, pattern, action, confidence)| ErrorPattern {
                category,
                // Table literals are static and known-valid; a bad pattern is
                // a programming error caught by the constructor test.
                pattern: Regex::new(pattern).unwrap_or_else(|e| {
                    panic!("invalid error pattern for category '{category}': {e}")
                }),
                action,
                confidence,
            })
            .collect();

        Self { patterns }
    }

    /// Classify one checkpoint.
    pub fn decide(&self, checkpoint: &StepCheckpoint) -> ResumeDecision {
        let step = &checkpoint.step;
        match step.status {
            StepStatus::Completed => ResumeDecision::new(
                ResumeAction::Resume,
                format!("Step '{}' completed; resume from the next step", step.id),
                0.95,
            )
            .from_step(step.id.clone())
            .with_alternative(
                ResumeAction::Restart,
                "Re-run the completed step for a clean slate",
                0.5,
            ),
            StepStatus::Pending | StepStatus::Executing => ResumeDecision::new(
                ResumeAction::Resume,
                format!("Step '{}' was interrupted mid-flight; resume it", step.id),
                0.9,
            )
            .from_step(step.id.clone())
            .with_alternative(ResumeAction::Skip, "Skip the interrupted step", 0.6)
            .with_alternative(ResumeAction::Restart, "Restart from the beginning", 0.4),
            StepStatus::Failed => self.decide_failed(checkpoint),
        }
    }

    fn decide_failed(&self, checkpoint: &StepCheckpoint) -> ResumeDecision {
        let step = &checkpoint.step;
        let Some(error) = &step.error else {
            // Failed with no error detail: treat as an unclassified
            // recoverable failure.
            return ResumeDecision::new(
                ResumeAction::Resume,
                format!("Step '{}' failed without error detail", step.id),
                0.65,
            )
            .from_step(step.id.clone());
        };

        if let Some(matched) = self.match_error(error) {
            let decision = ResumeDecision::new(
                matched.action,
                format!(
                    "Step '{}' failed with a {} error",
                    step.id, matched.category
                ),
                matched.confidence,
            )
            .from_step(step.id.clone());
            return adjust(decision, checkpoint, error);
        }

        if error.recoverable {
            ResumeDecision::new(
                ResumeAction::Resume,
                format!("Step '{}' failed with an unclassified recoverable error", step.id),
                0.65,
            )
            .from_step(step.id.clone())
        } else {
            ResumeDecision::new(
                ResumeAction::Abort,
                format!(
                    "Step '{}' failed with an unclassified non-recoverable error",
                    step.id
                ),
                0.7,
            )
        }
    }

    fn match_error(&self, error: &StepError) -> Option<&ErrorPattern> {
        let haystack = match &error.code {
            Some(code) => format!("{} {}", error.message, code),
            None => error.message.clone(),
        };
        let matched = self
            .patterns
            .iter()
            .find(|p| p.pattern.is_match(&haystack));
        if let Some(p) = matched {
            debug!(category = p.category, "Classified step error");
        }
        matched
    }

    /// Rank checkpoints and return the best resume point.
    ///
    /// Score is `confidence * action_weight`, boosted by 1.1 for checkpoints
    /// created within the last hour. Returns `None` for an empty list.
    pub fn find_best_resume_point(
        &self,
        checkpoints: &[StepCheckpoint],
    ) -> Option<(StepCheckpoint, ResumeDecision)> {
        let now = Utc::now();
        checkpoints
            .iter()
            .map(|checkpoint| {
                let decision = self.decide(checkpoint);
                let mut score = decision.confidence * decision.action.weight();
                if now - checkpoint.created_at < Duration::hours(1) {
                    score *= RECENCY_BOOST;
                }
                (checkpoint.clone(), decision, score)
            })
            .max_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(checkpoint, decision, _)| (checkpoint, decision))
    }
}

/// Apply the confidence adjustments for exhausted attempts and
/// non-recoverable errors.
fn adjust(
    mut decision: ResumeDecision,
    checkpoint: &StepCheckpoint,
    error: &StepError,
) -> ResumeDecision {
    let step = &checkpoint.step;
    let re_attempts = matches!(
        decision.action,
        ResumeAction::Resume | ResumeAction::Restart
    );

    if step.attempt_number >= step.max_attempts {
        decision.confidence = (decision.confidence - 0.3).max(0.3);
        decision.reason = format!("{} (attempts exhausted)", decision.reason);
        if re_attempts {
            decision = decision
                .with_alternative(
                    ResumeAction::Skip,
                    "Attempts exhausted; skipping may unblock the run",
                    0.6,
                )
                .with_alternative(
                    ResumeAction::Abort,
                    "Attempts exhausted; aborting avoids wasted work",
                    0.5,
                );
        }
    }

    if !error.recoverable && decision.action == ResumeAction::Resume {
        decision.confidence = (decision.confidence - 0.2).max(0.4);
        decision.reason = format!("{} (marked non-recoverable)", decision.reason);
    }

    decision
}
