//! Structural and semantic validation of contract definitions.
//!
//! Pure checks over a contract: nothing here evaluates predicates. Custom
//! rules supplied by the caller may themselves fail; their failures become
//! `CUSTOM_RULE_ERROR` issues and never propagate.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use super::contract::{AgentContract, ConditionType};
use super::registry::ContractRegistry;

/// Issue severity. Only `Error` issues make a contract invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

/// One finding from validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_id: Option<String>,
}

impl ValidationIssue {
    fn new(code: &str, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity,
            message: message.into(),
            condition_id: None,
        }
    }

    fn for_condition(mut self, condition_id: impl Into<String>) -> Self {
        self.condition_id = Some(condition_id.into());
        self
    }
}

/// Findings for one contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub contract_id: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Valid means no error-severity issues; warnings and infos are advice.
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }
}

/// Minimum-shape requirements.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    pub min_preconditions: usize,
    pub min_postconditions: usize,
    pub require_invariants: bool,
}

/// A caller-supplied rule. An `Err` is captured as a `CUSTOM_RULE_ERROR`
/// issue.
pub type CustomRule =
    Box<dyn Fn(&AgentContract) -> Result<Vec<ValidationIssue>, String> + Send + Sync>;

/// Standard preconditions recommended for well-known task types.
const STANDARD_PRECONDITIONS: &[(&str, &[&str])] = &[
    ("code", &["inputs-present", "workspace-clean"]),
    ("test", &["inputs-present", "build-succeeded"]),
    ("review", &["inputs-present", "diff-available"]),
];

/// Validates contract definitions.
pub struct ContractValidator {
    options: ValidatorOptions,
    custom_rules: Vec<CustomRule>,
    id_format: Regex,
}

impl Default for ContractValidator {
    fn default() -> Self {
        Self::new(ValidatorOptions::default())
    }
}

impl ContractValidator {
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            options,
            custom_rules: Vec::new(),
            // kebab-case ids keep reports and CLI flags readable
            id_format: Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$")
                .unwrap_or_else(|e| panic!("invalid id-format pattern: {e}")),
        }
    }

    /// Attach a custom rule, evaluated after the built-in checks.
    pub fn add_custom_rule(&mut self, rule: CustomRule) {
        self.custom_rules.push(rule);
    }

    /// Validate one contract in isolation.
    pub fn validate(&self, contract: &AgentContract) -> ValidationReport {
        let mut issues = Vec::new();

        self.check_id_format(contract, &mut issues);
        check_duplicate_condition_ids(contract, &mut issues);
        check_condition_positions(contract, &mut issues);
        self.check_minimums(contract, &mut issues);
        check_completeness(contract, &mut issues);
        check_consistency(contract, &mut issues);

        for rule in &self.custom_rules {
            match rule(contract) {
                Ok(found) => issues.extend(found),
                Err(e) => issues.push(ValidationIssue::new(
                    "CUSTOM_RULE_ERROR",
                    IssueSeverity::Error,
                    format!("custom rule failed: {e}"),
                )),
            }
        }

        ValidationReport {
            contract_id: contract.id.clone(),
            issues,
        }
    }

    /// Validate a contract against the registry it is about to join.
    pub fn validate_for_registration(
        &self,
        contract: &AgentContract,
        registry: &ContractRegistry,
    ) -> ValidationReport {
        let mut report = self.validate(contract);
        if registry.contains(&contract.id) {
            report.issues.push(ValidationIssue::new(
                "DUPLICATE_REGISTRY_ID",
                IssueSeverity::Error,
                format!("a contract with id '{}' is already registered", contract.id),
            ));
        }
        if registry.contains_name(&contract.name) {
            report.issues.push(ValidationIssue::new(
                "DUPLICATE_REGISTRY_NAME",
                IssueSeverity::Warning,
                format!(
                    "a contract named '{}' is already registered",
                    contract.name
                ),
            ));
        }
        report
    }

    fn check_id_format(&self, contract: &AgentContract, issues: &mut Vec<ValidationIssue>) {
        if !self.id_format.is_match(&contract.id) {
            issues.push(ValidationIssue::new(
                "INVALID_ID_FORMAT",
                IssueSeverity::Warning,
                format!("contract id '{}' is not kebab-case", contract.id),
            ));
        }
    }

    fn check_minimums(&self, contract: &AgentContract, issues: &mut Vec<ValidationIssue>) {
        if contract.preconditions.len() < self.options.min_preconditions {
            issues.push(ValidationIssue::new(
                "TOO_FEW_CONDITIONS",
                IssueSeverity::Error,
                format!(
                    "contract has {} preconditions, minimum is {}",
                    contract.preconditions.len(),
                    self.options.min_preconditions
                ),
            ));
        }
        if contract.postconditions.len() < self.options.min_postconditions {
            issues.push(ValidationIssue::new(
                "TOO_FEW_CONDITIONS",
                IssueSeverity::Error,
                format!(
                    "contract has {} postconditions, minimum is {}",
                    contract.postconditions.len(),
                    self.options.min_postconditions
                ),
            ));
        }
        if self.options.require_invariants && contract.invariants.is_empty() {
            issues.push(ValidationIssue::new(
                "TOO_FEW_CONDITIONS",
                IssueSeverity::Error,
                "contract has no invariants but invariants are required",
            ));
        }
    }
}

fn check_duplicate_condition_ids(contract: &AgentContract, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for condition in contract.conditions() {
        if !seen.insert(condition.id.as_str()) {
            issues.push(
                ValidationIssue::new(
                    "DUPLICATE_CONDITION_ID",
                    IssueSeverity::Error,
                    format!("condition id '{}' appears more than once", condition.id),
                )
                .for_condition(condition.id.clone()),
            );
        }
    }
}

fn check_condition_positions(contract: &AgentContract, issues: &mut Vec<ValidationIssue>) {
    let lists: [(&str, ConditionType, &[super::contract::Condition]); 3] = [
        ("preconditions", ConditionType::Precondition, &contract.preconditions),
        ("postconditions", ConditionType::Postcondition, &contract.postconditions),
        ("invariants", ConditionType::Invariant, &contract.invariants),
    ];
    for (list_name, expected, conditions) in lists {
        for condition in conditions {
            if condition.condition_type != expected {
                issues.push(
                    ValidationIssue::new(
                        "CONDITION_TYPE_MISMATCH",
                        IssueSeverity::Error,
                        format!(
                            "condition '{}' is typed {} but listed under {list_name}",
                            condition.id,
                            condition.condition_type.as_str()
                        ),
                    )
                    .for_condition(condition.id.clone()),
                );
            }
        }
    }
}

fn check_completeness(contract: &AgentContract, issues: &mut Vec<ValidationIssue>) {
    let Some((_, recommended)) = STANDARD_PRECONDITIONS
        .iter()
        .find(|(task_type, _)| *task_type == contract.task_type)
    else {
        return;
    };
    for name in *recommended {
        let present = contract
            .preconditions
            .iter()
            .any(|c| c.id == *name || c.name == *name);
        if !present {
            issues.push(ValidationIssue::new(
                "MISSING_STANDARD_PRECONDITION",
                IssueSeverity::Info,
                format!(
                    "task type '{}' usually carries a '{}' precondition",
                    contract.task_type, name
                ),
            ));
        }
    }
}

/// Flag pre/post pairs whose names are simple negations of each other.
fn check_consistency(contract: &AgentContract, issues: &mut Vec<ValidationIssue>) {
    let negated = |name: &str| -> Option<String> {
        name.strip_prefix("not-")
            .or_else(|| name.strip_prefix("not_"))
            .or_else(|| name.strip_prefix("no-"))
            .or_else(|| name.strip_prefix("no_"))
            .map(String::from)
    };
    for pre in &contract.preconditions {
        for post in &contract.postconditions {
            let contradictory = negated(&pre.name).is_some_and(|n| n == post.name)
                || negated(&post.name).is_some_and(|n| n == pre.name);
            if contradictory {
                issues.push(ValidationIssue::new(
                    "CONTRADICTORY_CONDITIONS",
                    IssueSeverity::Warning,
                    format!(
                        "precondition '{}' and postcondition '{}' look contradictory",
                        pre.name, post.name
                    ),
                ));
            }
        }
    }
}
