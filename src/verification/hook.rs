//! Commit-time verification hook.
//!
//! Evaluates a set of contracts against an execution context, aggregates
//! per-contract outcomes, and renders a deterministic report in text,
//! markdown, or JSON. Exit code 1 only when blocking and not passed.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::domain::models::ExecutionContext;

use super::contract::{AgentContract, ContractEvaluationResult, EvaluationOptions};
use super::validator::{ContractValidator, ValidationIssue};

/// Invocation mode, reflected in the report banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookMode {
    #[default]
    PreCommit,
    PrePush,
    Ci,
    Manual,
}

impl HookMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PrePush => "pre-push",
            Self::Ci => "ci",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for HookMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre-commit" => Ok(Self::PreCommit),
            "pre-push" => Ok(Self::PrePush),
            "ci" => Ok(Self::Ci),
            "manual" => Ok(Self::Manual),
            other => Err(format!(
                "unknown mode '{other}', expected pre-commit, pre-push, ci, or manual"
            )),
        }
    }
}

/// Report rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown format '{other}', expected text, markdown, or json"
            )),
        }
    }
}

/// Hook configuration. Defaults match the CLI defaults.
#[derive(Debug, Clone)]
pub struct HookConfig {
    pub mode: HookMode,
    pub detailed_report: bool,
    pub output_format: ReportFormat,
    pub block_on_failure: bool,
    /// Validate contract shape before evaluating
    pub validate_first: bool,
    /// Invalid contracts are skipped rather than counted as errors
    pub skip_on_validation_failure: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            mode: HookMode::PreCommit,
            detailed_report: false,
            output_format: ReportFormat::Text,
            block_on_failure: true,
            validate_first: true,
            skip_on_validation_failure: true,
        }
    }
}

/// Per-contract outcome bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Error => "ERROR",
        }
    }
}

/// One contract's outcome in the run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOutcome {
    pub contract_id: String,
    pub contract_name: String,
    pub status: ContractStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<ContractEvaluationResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<ValidationIssue>,
}

/// Aggregated hook run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookReport {
    pub mode: HookMode,
    pub passed: bool,
    pub total: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub outcomes: Vec<ContractOutcome>,
}

/// The hook itself.
pub struct VerificationHook {
    config: HookConfig,
    validator: ContractValidator,
}

impl Default for VerificationHook {
    fn default() -> Self {
        Self::new(HookConfig::default())
    }
}

impl VerificationHook {
    pub fn new(config: HookConfig) -> Self {
        Self {
            config,
            validator: ContractValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: ContractValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Evaluate every contract against the context.
    pub fn run(&self, contracts: &[Arc<AgentContract>], ctx: &ExecutionContext) -> HookReport {
        let mut outcomes = Vec::with_capacity(contracts.len());
        for contract in contracts {
            outcomes.push(self.run_one(contract, ctx));
        }

        let count = |status: ContractStatus| {
            outcomes.iter().filter(|o| o.status == status).count()
        };
        let failed_count = count(ContractStatus::Failed);
        let error_count = count(ContractStatus::Error);
        let report = HookReport {
            mode: self.config.mode,
            passed: failed_count == 0 && error_count == 0,
            total: outcomes.len(),
            passed_count: count(ContractStatus::Passed),
            failed_count,
            skipped_count: count(ContractStatus::Skipped),
            error_count,
            outcomes,
        };
        info!(
            mode = report.mode.as_str(),
            total = report.total,
            passed = report.passed_count,
            failed = report.failed_count,
            skipped = report.skipped_count,
            errors = report.error_count,
            "Verification hook finished"
        );
        report
    }

    fn run_one(&self, contract: &AgentContract, ctx: &ExecutionContext) -> ContractOutcome {
        if !contract.enabled {
            return ContractOutcome {
                contract_id: contract.id.clone(),
                contract_name: contract.name.clone(),
                status: ContractStatus::Skipped,
                detail: Some("contract disabled".to_string()),
                evaluation: None,
                validation_issues: Vec::new(),
            };
        }

        let mut validation_issues = Vec::new();
        if self.config.validate_first {
            let report = self.validator.validate(contract);
            if !report.is_valid() {
                let status = if self.config.skip_on_validation_failure {
                    ContractStatus::Skipped
                } else {
                    ContractStatus::Error
                };
                return ContractOutcome {
                    contract_id: contract.id.clone(),
                    contract_name: contract.name.clone(),
                    status,
                    detail: Some("contract definition failed validation".to_string()),
                    evaluation: None,
                    validation_issues: report.issues,
                };
            }
            validation_issues = report.issues;
        }

        let evaluation = contract.evaluate_all(ctx, &EvaluationOptions::default());
        let status = if evaluation.success {
            ContractStatus::Passed
        } else {
            ContractStatus::Failed
        };
        ContractOutcome {
            contract_id: contract.id.clone(),
            contract_name: contract.name.clone(),
            status,
            detail: None,
            evaluation: Some(evaluation),
            validation_issues,
        }
    }

    /// Render the report in the configured format.
    pub fn render(&self, report: &HookReport) -> String {
        match self.config.output_format {
            ReportFormat::Text => render_text(report, self.config.detailed_report),
            ReportFormat::Markdown => render_markdown(report, self.config.detailed_report),
            ReportFormat::Json => serde_json::to_string_pretty(report)
                .unwrap_or_else(|e| format!("{{\"error\":\"report serialization failed: {e}\"}}")),
        }
    }

    /// Process exit code: 1 only when blocking and not passed.
    pub fn exit_code(&self, report: &HookReport) -> i32 {
        i32::from(self.config.block_on_failure && !report.passed)
    }
}

fn render_text(report: &HookReport, detailed: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "==========================================");
    let _ = writeln!(out, " Contract Verification ({})", report.mode.as_str());
    let _ = writeln!(out, "==========================================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Contracts: {}", report.total);
    let _ = writeln!(out, "Passed:    {}", report.passed_count);
    let _ = writeln!(out, "Failed:    {}", report.failed_count);
    let _ = writeln!(out, "Skipped:   {}", report.skipped_count);
    let _ = writeln!(out, "Errors:    {}", report.error_count);

    if detailed && !report.outcomes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Contracts:");
        for outcome in &report.outcomes {
            let conditions = outcome
                .evaluation
                .as_ref()
                .map_or(0, |e| e.results.len());
            match &outcome.detail {
                Some(detail) => {
                    let _ = writeln!(
                        out,
                        "  {} [{}] - {detail}",
                        outcome.contract_id,
                        outcome.status.as_str()
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "  {} [{}] - {conditions} conditions",
                        outcome.contract_id,
                        outcome.status.as_str()
                    );
                }
            }
        }
    }

    let failures = collect_failures(report);
    if !failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures:");
        for line in failures {
            let _ = writeln!(out, "  {line}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Result: {}", if report.passed { "PASS" } else { "FAIL" });
    out
}

fn render_markdown(report: &HookReport, detailed: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Contract Verification ({})", report.mode.as_str());
    let _ = writeln!(out);
    let _ = writeln!(out, "| Counter | Value |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Contracts | {} |", report.total);
    let _ = writeln!(out, "| Passed | {} |", report.passed_count);
    let _ = writeln!(out, "| Failed | {} |", report.failed_count);
    let _ = writeln!(out, "| Skipped | {} |", report.skipped_count);
    let _ = writeln!(out, "| Errors | {} |", report.error_count);

    if detailed && !report.outcomes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Contracts");
        for outcome in &report.outcomes {
            let _ = writeln!(
                out,
                "- `{}` **{}**{}",
                outcome.contract_id,
                outcome.status.as_str(),
                outcome
                    .detail
                    .as_ref()
                    .map(|d| format!(" - {d}"))
                    .unwrap_or_default()
            );
        }
    }

    let failures = collect_failures(report);
    if !failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Failures");
        for line in failures {
            let _ = writeln!(out, "- {line}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "**Result: {}**", if report.passed { "PASS" } else { "FAIL" });
    out
}

fn collect_failures(report: &HookReport) -> Vec<String> {
    let mut lines = Vec::new();
    for outcome in &report.outcomes {
        if let Some(evaluation) = &outcome.evaluation {
            for failure in &evaluation.failures {
                lines.push(format!(
                    "{} :: {}: {}",
                    outcome.contract_id,
                    failure.condition_name,
                    failure.message.as_deref().unwrap_or("condition failed")
                ));
            }
        }
        if outcome.status == ContractStatus::Error {
            lines.push(format!(
                "{} :: {}",
                outcome.contract_id,
                outcome.detail.as_deref().unwrap_or("error")
            ));
        }
    }
    lines
}
