//! Exit conditions for bounded loops.
//!
//! An `ExitCondition` names one of five checks: a boolean predicate, a shell
//! command, a stored-value comparison, a drift threshold, or an AND/OR
//! composite. Predicates are small trait objects rather than bare closures
//! so callers can wire their own implementations; plain closures still work
//! through the blanket impl.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Default timeout for command conditions.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// A boolean check over the current loop context.
pub trait LoopPredicate: Send + Sync {
    /// Evaluate against the loop context. An `Err` is reported as an
    /// unsatisfied condition with a predicate-error message, never raised.
    fn check(&self, ctx: &LoopContext) -> Result<bool, String>;
}

impl<F> LoopPredicate for F
where
    F: Fn(&LoopContext) -> Result<bool, String> + Send + Sync,
{
    fn check(&self, ctx: &LoopContext) -> Result<bool, String> {
        self(ctx)
    }
}

/// AND/OR combinator for composite conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompositeOperator {
    And,
    Or,
}

/// The check an exit condition performs.
#[derive(Clone)]
pub enum ExitConditionSpec {
    /// Caller-supplied predicate over the loop context
    Boolean(Arc<dyn LoopPredicate>),

    /// Shell command whose exit code is compared to `expected_exit_code`
    Command {
        command: String,
        expected_exit_code: i32,
        timeout: Duration,
        cwd: Option<PathBuf>,
    },

    /// Deep-equality comparison against a value stored in the loop context
    StepReference {
        reference: String,
        path: Option<String>,
        expected: Value,
    },

    /// Measured drift percentage at or below the target satisfies the loop
    Drift { target_percent: f64 },

    /// Short-circuiting AND/OR over child conditions
    Composite {
        operator: CompositeOperator,
        children: Vec<ExitCondition>,
    },
}

impl ExitConditionSpec {
    /// Stable type tag used in evaluation results.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Command { .. } => "command",
            Self::StepReference { .. } => "step_reference",
            Self::Drift { .. } => "drift",
            Self::Composite { .. } => "composite",
        }
    }
}

impl fmt::Debug for ExitConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(_) => f.write_str("Boolean(<predicate>)"),
            Self::Command {
                command,
                expected_exit_code,
                timeout,
                cwd,
            } => f
                .debug_struct("Command")
                .field("command", command)
                .field("expected_exit_code", expected_exit_code)
                .field("timeout", timeout)
                .field("cwd", cwd)
                .finish(),
            Self::StepReference {
                reference,
                path,
                expected,
            } => f
                .debug_struct("StepReference")
                .field("reference", reference)
                .field("path", path)
                .field("expected", expected)
                .finish(),
            Self::Drift { target_percent } => f
                .debug_struct("Drift")
                .field("target_percent", target_percent)
                .finish(),
            Self::Composite { operator, children } => f
                .debug_struct("Composite")
                .field("operator", operator)
                .field("children", &children.len())
                .finish(),
        }
    }
}

/// A named exit condition.
#[derive(Debug, Clone)]
pub struct ExitCondition {
    pub name: String,
    pub spec: ExitConditionSpec,
}

impl ExitCondition {
    /// A condition backed by a caller-supplied predicate.
    pub fn boolean(name: impl Into<String>, predicate: impl LoopPredicate + 'static) -> Self {
        Self {
            name: name.into(),
            spec: ExitConditionSpec::Boolean(Arc::new(predicate)),
        }
    }

    /// A shell-command condition with default exit code 0 and timeout.
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: ExitConditionSpec::Command {
                command: command.into(),
                expected_exit_code: 0,
                timeout: DEFAULT_COMMAND_TIMEOUT,
                cwd: None,
            },
        }
    }

    /// A stored-value comparison: looks up `reference` in the loop context's
    /// user data, optionally walks a dotted `path`, then deep-compares.
    pub fn step_reference(
        name: impl Into<String>,
        reference: impl Into<String>,
        path: Option<String>,
        expected: Value,
    ) -> Self {
        Self {
            name: name.into(),
            spec: ExitConditionSpec::StepReference {
                reference: reference.into(),
                path,
                expected,
            },
        }
    }

    /// A drift-threshold condition.
    pub fn drift(name: impl Into<String>, target_percent: f64) -> Self {
        Self {
            name: name.into(),
            spec: ExitConditionSpec::Drift { target_percent },
        }
    }

    /// An AND composite over child conditions.
    pub fn all(name: impl Into<String>, children: Vec<ExitCondition>) -> Self {
        Self {
            name: name.into(),
            spec: ExitConditionSpec::Composite {
                operator: CompositeOperator::And,
                children,
            },
        }
    }

    /// An OR composite over child conditions.
    pub fn any(name: impl Into<String>, children: Vec<ExitCondition>) -> Self {
        Self {
            name: name.into(),
            spec: ExitConditionSpec::Composite {
                operator: CompositeOperator::Or,
                children,
            },
        }
    }

    /// Override the expected exit code of a command condition. No-op for
    /// other variants.
    pub fn expect_exit_code(mut self, code: i32) -> Self {
        if let ExitConditionSpec::Command {
            expected_exit_code, ..
        } = &mut self.spec
        {
            *expected_exit_code = code;
        }
        self
    }

    /// Override the timeout of a command condition. No-op for other variants.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let ExitConditionSpec::Command { timeout: t, .. } = &mut self.spec {
            *t = timeout;
        }
        self
    }

    /// Set the working directory of a command condition. No-op for other
    /// variants.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if let ExitConditionSpec::Command { cwd, .. } = &mut self.spec {
            *cwd = Some(dir.into());
        }
        self
    }
}

/// Outcome of evaluating one exit condition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionEvaluationResult {
    pub satisfied: bool,
    pub condition_name: String,
    pub condition_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<Value>,
    pub message: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_results: Vec<ConditionEvaluationResult>,
}

/// Mutable state threaded through a bounded loop.
///
/// `user_data` holds step outputs keyed by symbolic name (opaque JSON
/// values); `drift_rate` is populated by the caller when a drift condition
/// participates in the loop.
#[derive(Debug, Clone, Default)]
pub struct LoopContext {
    /// 0-based iteration counter, incremented by the loop driver
    pub iteration: u32,

    /// Step outputs keyed by symbolic reference
    pub user_data: HashMap<String, Value>,

    /// Most recently measured drift percentage, when available
    pub drift_rate: Option<f64>,

    /// Raw output of the most recent loop body run, when available
    pub last_output: Option<String>,
}

impl LoopContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a step output under a symbolic key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.user_data.insert(key.into(), value);
    }

    /// Fetch a stored step output.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.user_data.get(key)
    }
}
