//! Exit-condition evaluation.
//!
//! Evaluates the five exit-condition variants against a loop context.
//! Runtime violations (a failing command, a missing reference) are returned
//! as unsatisfied results; only structurally invalid conditions raise
//! [`ConditionError::InvalidCondition`].

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::error::ConditionError;
use crate::domain::models::{
    CompositeOperator, ConditionEvaluationResult, ExitCondition, ExitConditionSpec, LoopContext,
};

/// Cap on captured subprocess output (stdout and stderr each).
const OUTPUT_CAP_BYTES: u64 = 10 * 1024 * 1024;

/// Evaluates exit conditions.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a condition against the loop context.
    pub async fn evaluate(
        &self,
        condition: &ExitCondition,
        ctx: &LoopContext,
    ) -> Result<ConditionEvaluationResult, ConditionError> {
        validate(condition)?;
        let started = Instant::now();
        let mut result = match &condition.spec {
            ExitConditionSpec::Boolean(predicate) => {
                self.evaluate_boolean(condition, predicate.check(ctx))
            }
            ExitConditionSpec::Command {
                command,
                expected_exit_code,
                timeout,
                cwd,
            } => {
                self.evaluate_command(condition, command, *expected_exit_code, *timeout, cwd.as_deref())
                    .await
            }
            ExitConditionSpec::StepReference {
                reference,
                path,
                expected,
            } => self.evaluate_step_reference(condition, ctx, reference, path.as_deref(), expected),
            ExitConditionSpec::Drift { target_percent } => {
                self.evaluate_drift(condition, ctx, *target_percent)
            }
            ExitConditionSpec::Composite { operator, children } => {
                self.evaluate_composite(condition, ctx, *operator, children)
                    .await?
            }
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            condition = %condition.name,
            kind = result.condition_type,
            satisfied = result.satisfied,
            "Evaluated exit condition"
        );
        Ok(result)
    }

    fn evaluate_boolean(
        &self,
        condition: &ExitCondition,
        checked: Result<bool, String>,
    ) -> ConditionEvaluationResult {
        match checked {
            Ok(satisfied) => base_result(
                condition,
                satisfied,
                format!(
                    "{}: {}",
                    condition.name,
                    if satisfied { "satisfied" } else { "not satisfied" }
                ),
            ),
            Err(message) => base_result(
                condition,
                false,
                format!("{}: Predicate error - {message}", condition.name),
            ),
        }
    }

    async fn evaluate_command(
        &self,
        condition: &ExitCondition,
        command: &str,
        expected_exit_code: i32,
        timeout: Duration,
        cwd: Option<&std::path::Path>,
    ) -> ConditionEvaluationResult {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return base_result(
                    condition,
                    false,
                    format!("Command failed - could not spawn: {e}"),
                );
            }
        };

        // The child (and its kill_on_drop guard) lives inside this future,
        // so a timeout that drops it also kills the subprocess.
        let collect = async move {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            if let Some(stdout) = child.stdout.take() {
                let _ = stdout
                    .take(OUTPUT_CAP_BYTES)
                    .read_to_end(&mut stdout_buf)
                    .await;
            }
            if let Some(stderr) = child.stderr.take() {
                let _ = stderr
                    .take(OUTPUT_CAP_BYTES)
                    .read_to_end(&mut stderr_buf)
                    .await;
            }
            let status = child.wait().await;
            (status, stdout_buf, stderr_buf)
        };

        let (status, _stdout, stderr) = match tokio::time::timeout(timeout, collect).await {
            Ok(collected) => collected,
            Err(_) => {
                return base_result(
                    condition,
                    false,
                    format!(
                        "Command failed - timed out after {}s",
                        timeout.as_secs_f64()
                    ),
                );
            }
        };

        let actual = match status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                return base_result(condition, false, format!("Command failed - {e}"));
            }
        };

        let satisfied = actual == expected_exit_code;
        let message = if satisfied {
            format!("{}: command exited with {actual}", condition.name)
        } else {
            let stderr_text = String::from_utf8_lossy(&stderr);
            let detail = stderr_text.lines().next().unwrap_or("").trim().to_string();
            if detail.is_empty() {
                format!("Command failed - expected exit code {expected_exit_code}, got {actual}")
            } else {
                format!(
                    "Command failed - expected exit code {expected_exit_code}, got {actual}: {detail}"
                )
            }
        };
        let mut result = base_result(condition, satisfied, message);
        result.actual_value = Some(json!(actual));
        result.expected_value = Some(json!(expected_exit_code));
        result
    }

    fn evaluate_step_reference(
        &self,
        condition: &ExitCondition,
        ctx: &LoopContext,
        reference: &str,
        path: Option<&str>,
        expected: &Value,
    ) -> ConditionEvaluationResult {
        let Some(root) = ctx.get(reference) else {
            return base_result(
                condition,
                false,
                format!("{}: reference '{reference}' not found", condition.name),
            );
        };

        let actual = match path {
            Some(path) => match walk_path(root, path) {
                Some(value) => value,
                None => {
                    return base_result(
                        condition,
                        false,
                        format!(
                            "{}: path '{path}' not found under '{reference}'",
                            condition.name
                        ),
                    );
                }
            },
            None => root,
        };

        // serde_json equality is structural: maps compare order-insensitively,
        // sequences in order.
        let satisfied = actual == expected;
        let message = if satisfied {
            format!("{}: '{reference}' matches expected value", condition.name)
        } else {
            format!("{}: '{reference}' does not match expected value", condition.name)
        };
        let mut result = base_result(condition, satisfied, message);
        result.actual_value = Some(actual.clone());
        result.expected_value = Some(expected.clone());
        result
    }

    fn evaluate_drift(
        &self,
        condition: &ExitCondition,
        ctx: &LoopContext,
        target_percent: f64,
    ) -> ConditionEvaluationResult {
        let Some(measured) = ctx.drift_rate else {
            return base_result(
                condition,
                false,
                format!("{}: no drift measurement available", condition.name),
            );
        };
        let satisfied = measured <= target_percent;
        let message = format!(
            "{}: drift {measured:.2}% vs target {target_percent:.2}%",
            condition.name
        );
        let mut result = base_result(condition, satisfied, message);
        result.actual_value = Some(json!(measured));
        result.expected_value = Some(json!(target_percent));
        result
    }

    async fn evaluate_composite(
        &self,
        condition: &ExitCondition,
        ctx: &LoopContext,
        operator: CompositeOperator,
        children: &[ExitCondition],
    ) -> Result<ConditionEvaluationResult, ConditionError> {
        let mut child_results = Vec::new();
        let mut satisfied = operator == CompositeOperator::And;

        for child in children {
            let child_result = Box::pin(self.evaluate(child, ctx)).await?;
            let child_satisfied = child_result.satisfied;
            child_results.push(child_result);
            match operator {
                CompositeOperator::And if !child_satisfied => {
                    satisfied = false;
                    break;
                }
                CompositeOperator::Or if child_satisfied => {
                    satisfied = true;
                    break;
                }
                _ => {}
            }
        }

        let evaluated = child_results.len();
        let message = match operator {
            CompositeOperator::And => format!(
                "{}: AND over {evaluated}/{} children",
                condition.name,
                children.len()
            ),
            CompositeOperator::Or => format!(
                "{}: OR over {evaluated}/{} children",
                condition.name,
                children.len()
            ),
        };
        let mut result = base_result(condition, satisfied, message);
        result.child_results = child_results;
        Ok(result)
    }
}

fn base_result(
    condition: &ExitCondition,
    satisfied: bool,
    message: String,
) -> ConditionEvaluationResult {
    ConditionEvaluationResult {
        satisfied,
        condition_name: condition.name.clone(),
        condition_type: condition.spec.type_name().to_string(),
        actual_value: None,
        expected_value: None,
        message,
        duration_ms: 0,
        child_results: Vec::new(),
    }
}

/// Structural-shape validation. The tagged enum makes unknown variants
/// unrepresentable; what remains is rejecting conditions that can never be
/// evaluated meaningfully.
fn validate(condition: &ExitCondition) -> Result<(), ConditionError> {
    match &condition.spec {
        ExitConditionSpec::Command { command, .. } if command.trim().is_empty() => Err(
            ConditionError::invalid(&condition.name, "command is empty"),
        ),
        ExitConditionSpec::StepReference { reference, .. } if reference.is_empty() => Err(
            ConditionError::invalid(&condition.name, "reference key is empty"),
        ),
        ExitConditionSpec::Composite { children, .. } if children.is_empty() => Err(
            ConditionError::invalid(&condition.name, "composite has no children"),
        ),
        _ => Ok(()),
    }
}

/// Walk a dotted path through a JSON value. Array segments may be numeric
/// indexes.
fn walk_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> LoopContext {
        LoopContext::new()
    }

    #[tokio::test]
    async fn test_boolean_satisfied() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::boolean("always", |_: &LoopContext| Ok(true));
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(result.satisfied);
        assert_eq!(result.condition_type, "boolean");
    }

    #[tokio::test]
    async fn test_boolean_predicate_error_is_unsatisfied() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::boolean("broken", |_: &LoopContext| {
            Err("division by zero".to_string())
        });
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(!result.satisfied);
        assert_eq!(result.message, "broken: Predicate error - division by zero");
    }

    #[tokio::test]
    async fn test_command_exit_code_match() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::command("truthy", "exit 0");
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(result.satisfied);
        assert_eq!(result.actual_value, Some(json!(0)));
    }

    #[tokio::test]
    async fn test_command_exit_code_mismatch() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::command("failing", "exit 3");
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(!result.satisfied);
        assert!(result.message.starts_with("Command failed - "));
        assert_eq!(result.actual_value, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_command_expected_nonzero() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::command("expect-three", "exit 3").expect_exit_code(3);
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(result.satisfied);
    }

    #[tokio::test]
    async fn test_command_timeout_is_violation() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::command("slow", "sleep 5")
            .with_timeout(Duration::from_millis(50));
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(!result.satisfied);
        assert!(result.message.starts_with("Command failed - timed out"));
    }

    #[tokio::test]
    async fn test_empty_command_is_invalid() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::command("empty", "   ");
        let err = evaluator.evaluate(&condition, &ctx()).await.unwrap_err();
        assert!(matches!(err, ConditionError::InvalidCondition { .. }));
    }

    #[tokio::test]
    async fn test_step_reference_missing() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::step_reference("ref", "build", None, json!("ok"));
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(!result.satisfied);
        assert!(result.message.contains("'build' not found"));
    }

    #[tokio::test]
    async fn test_step_reference_dotted_path() {
        let evaluator = ConditionEvaluator::new();
        let mut ctx = ctx();
        ctx.set("build", json!({"result": {"status": "ok", "warnings": [1, 2]}}));

        let condition =
            ExitCondition::step_reference("ref", "build", Some("result.status".into()), json!("ok"));
        let result = evaluator.evaluate(&condition, &ctx).await.unwrap();
        assert!(result.satisfied);

        let condition = ExitCondition::step_reference(
            "ref",
            "build",
            Some("result.warnings.1".into()),
            json!(2),
        );
        let result = evaluator.evaluate(&condition, &ctx).await.unwrap();
        assert!(result.satisfied);

        let condition = ExitCondition::step_reference(
            "ref",
            "build",
            Some("result.missing".into()),
            json!("ok"),
        );
        let result = evaluator.evaluate(&condition, &ctx).await.unwrap();
        assert!(!result.satisfied);
    }

    #[tokio::test]
    async fn test_step_reference_structural_equality() {
        let evaluator = ConditionEvaluator::new();
        let mut ctx = ctx();
        ctx.set("report", json!({"a": 1, "b": [1, 2, 3]}));
        // Key order differs; structural equality still holds
        let condition = ExitCondition::step_reference(
            "ref",
            "report",
            None,
            json!({"b": [1, 2, 3], "a": 1}),
        );
        let result = evaluator.evaluate(&condition, &ctx).await.unwrap();
        assert!(result.satisfied);
    }

    #[tokio::test]
    async fn test_drift_condition() {
        let evaluator = ConditionEvaluator::new();
        let mut ctx = ctx();
        ctx.drift_rate = Some(4.5);

        let result = evaluator
            .evaluate(&ExitCondition::drift("stable", 5.0), &ctx)
            .await
            .unwrap();
        assert!(result.satisfied);

        let result = evaluator
            .evaluate(&ExitCondition::drift("strict", 0.0), &ctx)
            .await
            .unwrap();
        assert!(!result.satisfied);
    }

    #[tokio::test]
    async fn test_drift_without_measurement_is_unsatisfied() {
        let evaluator = ConditionEvaluator::new();
        let result = evaluator
            .evaluate(&ExitCondition::drift("stable", 5.0), &ctx())
            .await
            .unwrap();
        assert!(!result.satisfied);
    }

    #[tokio::test]
    async fn test_composite_and_short_circuits() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::all(
            "both",
            vec![
                ExitCondition::boolean("no", |_: &LoopContext| Ok(false)),
                ExitCondition::boolean(
                    "unreached",
                    |_: &LoopContext| -> Result<bool, String> {
                        panic!("short-circuit skips this child")
                    },
                ),
            ],
        );
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(!result.satisfied);
        assert_eq!(result.child_results.len(), 1);
    }

    #[tokio::test]
    async fn test_composite_or_short_circuits() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::any(
            "either",
            vec![
                ExitCondition::boolean("yes", |_: &LoopContext| Ok(true)),
                ExitCondition::boolean(
                    "unreached",
                    |_: &LoopContext| -> Result<bool, String> {
                        panic!("short-circuit skips this child")
                    },
                ),
            ],
        );
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(result.satisfied);
        assert_eq!(result.child_results.len(), 1);
    }

    #[tokio::test]
    async fn test_composite_empty_is_invalid() {
        let evaluator = ConditionEvaluator::new();
        let err = evaluator
            .evaluate(&ExitCondition::all("empty", vec![]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionError::InvalidCondition { .. }));
    }

    #[tokio::test]
    async fn test_nested_composite() {
        let evaluator = ConditionEvaluator::new();
        let condition = ExitCondition::all(
            "outer",
            vec![
                ExitCondition::boolean("yes", |_: &LoopContext| Ok(true)),
                ExitCondition::any(
                    "inner",
                    vec![
                        ExitCondition::boolean("no", |_: &LoopContext| Ok(false)),
                        ExitCondition::boolean("yes", |_: &LoopContext| Ok(true)),
                    ],
                ),
            ],
        );
        let result = evaluator.evaluate(&condition, &ctx()).await.unwrap();
        assert!(result.satisfied);
        assert_eq!(result.child_results.len(), 2);
        assert_eq!(result.child_results[1].child_results.len(), 2);
    }

    #[test]
    fn test_walk_path() {
        let value = json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(walk_path(&value, "a.b.0"), Some(&json!(10)));
        assert_eq!(walk_path(&value, "a.b.1.c"), Some(&json!(true)));
        assert!(walk_path(&value, "a.x").is_none());
        assert!(walk_path(&value, "a.b.5").is_none());
    }
}
