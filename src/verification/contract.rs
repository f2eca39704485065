//! Conditions and agent contracts.
//!
//! A contract is a triple of condition lists (preconditions, postconditions,
//! invariants) evaluated against an execution context. Evaluation never
//! raises: predicate errors become error-severity failures.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::domain::models::ExecutionContext;

/// Where a condition sits in the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Precondition,
    Postcondition,
    Invariant,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precondition => "precondition",
            Self::Postcondition => "postcondition",
            Self::Invariant => "invariant",
        }
    }
}

/// Whether a failing condition fails the contract or only warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A boolean check over an execution context.
///
/// Implement this for reusable checks; plain closures work through the
/// blanket impl.
pub trait ContextPredicate: Send + Sync {
    /// An `Err` is reported as an error-severity failure, never raised.
    fn check(&self, ctx: &ExecutionContext) -> Result<bool, String>;
}

impl<F> ContextPredicate for F
where
    F: Fn(&ExecutionContext) -> Result<bool, String> + Send + Sync,
{
    fn check(&self, ctx: &ExecutionContext) -> Result<bool, String> {
        self(ctx)
    }
}

/// One verifiable condition.
#[derive(Clone)]
pub struct Condition {
    pub id: String,
    pub name: String,
    pub condition_type: ConditionType,
    predicate: Arc<dyn ContextPredicate>,
    pub error_message: String,
    pub severity: Severity,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("condition_type", &self.condition_type)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

impl Condition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition_type: ConditionType,
        predicate: impl ContextPredicate + 'static,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition_type,
            predicate: Arc::new(predicate),
            error_message: error_message.into(),
            severity: Severity::Error,
        }
    }

    /// Shorthand for a precondition.
    pub fn precondition(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: impl ContextPredicate + 'static,
        error_message: impl Into<String>,
    ) -> Self {
        Self::new(id, name, ConditionType::Precondition, predicate, error_message)
    }

    /// Shorthand for a postcondition.
    pub fn postcondition(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: impl ContextPredicate + 'static,
        error_message: impl Into<String>,
    ) -> Self {
        Self::new(id, name, ConditionType::Postcondition, predicate, error_message)
    }

    /// Shorthand for an invariant.
    pub fn invariant(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: impl ContextPredicate + 'static,
        error_message: impl Into<String>,
    ) -> Self {
        Self::new(id, name, ConditionType::Invariant, predicate, error_message)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Evaluate the predicate under a monotonic clock.
    pub fn evaluate(&self, ctx: &ExecutionContext) -> ConditionResult {
        let started = Instant::now();
        let (passed, severity, message) = match self.predicate.check(ctx) {
            Ok(true) => (true, self.severity, None),
            Ok(false) => (false, self.severity, Some(self.error_message.clone())),
            Err(e) => (
                false,
                Severity::Error,
                Some(format!("Condition evaluation failed: {e}")),
            ),
        };
        ConditionResult {
            condition_id: self.id.clone(),
            condition_name: self.name.clone(),
            condition_type: self.condition_type,
            passed,
            severity,
            message,
            duration_ms: started.elapsed().as_secs_f64() * 1_000.0,
        }
    }
}

/// Outcome of evaluating one condition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionResult {
    pub condition_id: String,
    pub condition_name: String,
    pub condition_type: ConditionType,
    pub passed: bool,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: f64,
}

impl ConditionResult {
    /// A failed result with error severity counts against the contract.
    pub fn is_failure(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        !self.passed && self.severity == Severity::Warning
    }
}

/// How a contract is meant to be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMethod {
    Runtime,
    PropertyTest,
    Formal,
    Hybrid,
}

/// Options for one evaluation pass. Each condition subset can be disabled.
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    pub check_preconditions: bool,
    pub check_postconditions: bool,
    pub check_invariants: bool,
    pub stop_on_first_failure: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            check_preconditions: true,
            check_postconditions: true,
            check_invariants: true,
            stop_on_first_failure: false,
        }
    }
}

/// A contract: condition triple plus routing metadata.
#[derive(Debug, Clone)]
pub struct AgentContract {
    pub id: String,
    pub name: String,
    pub task_type: String,
    pub tags: Vec<String>,
    pub preconditions: Vec<Condition>,
    pub postconditions: Vec<Condition>,
    pub invariants: Vec<Condition>,
    pub verification_method: VerificationMethod,
    pub enabled: bool,
}

impl AgentContract {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            task_type: task_type.into(),
            tags: Vec::new(),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            invariants: Vec::new(),
            verification_method: VerificationMethod::Runtime,
            enabled: true,
        }
    }

    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn with_postcondition(mut self, condition: Condition) -> Self {
        self.postconditions.push(condition);
        self
    }

    pub fn with_invariant(mut self, condition: Condition) -> Self {
        self.invariants.push(condition);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_verification_method(mut self, method: VerificationMethod) -> Self {
        self.verification_method = method;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// All conditions, in evaluation order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.preconditions
            .iter()
            .chain(&self.postconditions)
            .chain(&self.invariants)
    }

    /// Evaluate preconditions, postconditions, and invariants, in that fixed
    /// order. `success` is true iff no error-severity condition failed.
    pub fn evaluate_all(
        &self,
        ctx: &ExecutionContext,
        options: &EvaluationOptions,
    ) -> ContractEvaluationResult {
        let started = Instant::now();
        let mut results = Vec::new();
        let mut stopped = false;

        let groups: [(&[Condition], bool); 3] = [
            (&self.preconditions, options.check_preconditions),
            (&self.postconditions, options.check_postconditions),
            (&self.invariants, options.check_invariants),
        ];

        'groups: for (conditions, enabled) in groups {
            if !enabled {
                continue;
            }
            for condition in conditions {
                let result = condition.evaluate(ctx);
                let failure = result.is_failure();
                results.push(result);
                if failure && options.stop_on_first_failure {
                    stopped = true;
                    break 'groups;
                }
            }
        }

        let failures: Vec<ConditionResult> =
            results.iter().filter(|r| r.is_failure()).cloned().collect();
        let warnings: Vec<ConditionResult> =
            results.iter().filter(|r| r.is_warning()).cloned().collect();

        ContractEvaluationResult {
            contract_id: self.id.clone(),
            contract_name: self.name.clone(),
            success: failures.is_empty(),
            stopped_early: stopped,
            results,
            failures,
            warnings,
            duration_ms: started.elapsed().as_secs_f64() * 1_000.0,
        }
    }
}

/// Aggregated evaluation outcome for one contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvaluationResult {
    pub contract_id: String,
    pub contract_name: String,
    pub success: bool,
    pub stopped_early: bool,
    pub results: Vec<ConditionResult>,
    pub failures: Vec<ConditionResult>,
    pub warnings: Vec<ConditionResult>,
    pub duration_ms: f64,
}
