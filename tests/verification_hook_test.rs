//! Verification stack integration: registry-driven hook runs and report
//! rendering.

use std::sync::Arc;

use serde_json::json;

use breakwater::domain::models::{ExecutionContext, ExecutionState};
use breakwater::verification::{
    AgentContract, Condition, ContractRegistry, ContractValidator, HookConfig, HookMode,
    ReportFormat, Severity, VerificationHook,
};

fn context_with_outputs() -> ExecutionContext {
    let mut ctx = ExecutionContext::new("scope-7", "task-42")
        .with_input("prompt", json!("implement the parser"))
        .with_state(ExecutionState::Verifying);
    ctx.set_output("summary", json!("parser implemented"));
    ctx.set_output("filesModified", json!(["src/parser.rs"]));
    ctx
}

fn code_contract() -> AgentContract {
    AgentContract::new("code-task", "Code task contract", "code")
        .with_tag("strict")
        .with_precondition(Condition::precondition(
            "inputs-present",
            "inputs-present",
            |ctx: &ExecutionContext| Ok(ctx.input_str("prompt").is_some()),
            "prompt input missing",
        ))
        .with_postcondition(Condition::postcondition(
            "summary-produced",
            "summary-produced",
            |ctx: &ExecutionContext| Ok(ctx.has_output("summary")),
            "no summary output",
        ))
        .with_invariant(Condition::invariant(
            "not-failed",
            "not-failed",
            |ctx: &ExecutionContext| Ok(ctx.state != ExecutionState::Failed),
            "context entered a failed state",
        ))
}

fn strict_contract() -> AgentContract {
    AgentContract::new("files-modified", "Files modified contract", "code")
        .with_postcondition(Condition::postcondition(
            "tests-written",
            "tests-written",
            |ctx: &ExecutionContext| Ok(ctx.has_output("testsWritten")),
            "no tests were written",
        ))
        .with_postcondition(
            Condition::postcondition(
                "next-steps",
                "next-steps",
                |ctx: &ExecutionContext| Ok(ctx.has_output("nextSteps")),
                "no next steps recorded",
            )
            .with_severity(Severity::Warning),
        )
}

#[test]
fn registry_drives_hook_run() {
    let registry = ContractRegistry::new();
    registry.register(code_contract()).unwrap();
    registry.register(strict_contract()).unwrap();
    registry
        .register(AgentContract::new("disabled", "Disabled contract", "code").disabled())
        .unwrap();

    let hook = VerificationHook::new(HookConfig {
        mode: HookMode::Ci,
        detailed_report: true,
        ..Default::default()
    });
    let report = hook.run(&registry.by_task_type("code"), &context_with_outputs());

    assert_eq!(report.total, 3);
    assert_eq!(report.passed_count, 1); // code-task
    assert_eq!(report.failed_count, 1); // files-modified (tests-written)
    assert_eq!(report.skipped_count, 1); // disabled
    assert!(!report.passed);
    assert_eq!(hook.exit_code(&report), 1);

    let text = hook.render(&report);
    assert!(text.contains("Contract Verification (ci)"));
    assert!(text.contains("files-modified :: tests-written: no tests were written"));
    // The warning-severity failure does not appear in the failures block
    assert!(!text.contains("next-steps"));
}

#[test]
fn warnings_do_not_block() {
    let contract = Arc::new(
        AgentContract::new("advice", "Advice only", "code").with_postcondition(
            Condition::postcondition(
                "next-steps",
                "next-steps",
                |ctx: &ExecutionContext| Ok(ctx.has_output("nextSteps")),
                "no next steps recorded",
            )
            .with_severity(Severity::Warning),
        ),
    );
    let hook = VerificationHook::default();
    let report = hook.run(&[contract], &context_with_outputs());
    assert!(report.passed);
    assert_eq!(hook.exit_code(&report), 0);
}

#[test]
fn validator_gates_registration() {
    let registry = ContractRegistry::new();
    registry.register(code_contract()).unwrap();

    let validator = ContractValidator::default();
    let duplicate = AgentContract::new("code-task", "Another name", "code");
    let report = validator.validate_for_registration(&duplicate, &registry);
    assert!(!report.is_valid());

    let fresh = code_contract();
    let fresh = AgentContract {
        id: "code-task-v2".to_string(),
        ..fresh
    };
    let report = validator.validate_for_registration(&fresh, &registry);
    assert!(report.is_valid());
}

#[test]
fn json_report_is_machine_readable() {
    let hook = VerificationHook::new(HookConfig {
        output_format: ReportFormat::Json,
        mode: HookMode::PrePush,
        ..Default::default()
    });
    let report = hook.run(&[Arc::new(code_contract())], &context_with_outputs());
    let json: serde_json::Value = serde_json::from_str(&hook.render(&report)).unwrap();
    assert_eq!(json["mode"], "pre-push");
    assert_eq!(json["total"], 1);
    assert_eq!(json["passedCount"], 1);
    assert_eq!(json["outcomes"][0]["contractId"], "code-task");
}
