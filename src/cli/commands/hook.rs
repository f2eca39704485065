//! `breakwater hook` - the commit-time verification hook.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use crate::cli::HookArgs;
use crate::domain::models::{ExecutionContext, ExecutionState};
use crate::verification::{
    AgentContract, Condition, HookConfig, VerificationHook,
};

/// Built-in contracts the hook always carries. Callers embedding the hook
/// as a library register their own contracts instead.
fn default_contracts() -> Vec<Arc<AgentContract>> {
    let integrity = AgentContract::new(
        "execution-context-integrity",
        "Execution context integrity",
        "hook",
    )
    .with_precondition(Condition::precondition(
        "context-has-task",
        "context-has-task",
        |ctx: &ExecutionContext| Ok(!ctx.task_id.is_empty()),
        "execution context has no task id",
    ))
    .with_invariant(Condition::invariant(
        "state-not-failed",
        "state-not-failed",
        |ctx: &ExecutionContext| Ok(ctx.state != ExecutionState::Failed),
        "execution context is in a failed state",
    ));

    let inputs = AgentContract::new("hook-inputs", "Hook inputs", "hook").with_precondition(
        Condition::precondition(
            "mode-recorded",
            "mode-recorded",
            |ctx: &ExecutionContext| Ok(ctx.input_str("mode").is_some()),
            "hook mode was not recorded in the context",
        ),
    );

    vec![Arc::new(integrity), Arc::new(inputs)]
}

/// Run the hook and return the process exit code.
pub fn handle_hook(args: &HookArgs) -> Result<i32> {
    let config = HookConfig {
        mode: args.mode.parse().map_err(anyhow::Error::msg)?,
        detailed_report: args.detailed_report,
        output_format: args.output_format.parse().map_err(anyhow::Error::msg)?,
        block_on_failure: args.block_on_failure,
        ..Default::default()
    };

    let ctx = ExecutionContext::new("hook", config.mode.as_str())
        .with_input("mode", json!(config.mode.as_str()))
        .with_state(ExecutionState::Verifying);

    let hook = VerificationHook::new(config);
    let report = hook.run(&default_contracts(), &ctx);
    println!("{}", hook.render(&report));
    Ok(hook.exit_code(&report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: &str, format: &str) -> HookArgs {
        HookArgs {
            mode: mode.to_string(),
            detailed_report: false,
            output_format: format.to_string(),
            block_on_failure: true,
        }
    }

    #[test]
    fn test_default_contracts_pass_in_hook_context() {
        let code = handle_hook(&args("pre-commit", "text")).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_bad_mode_is_an_error() {
        assert!(handle_hook(&args("nightly", "text")).is_err());
    }

    #[test]
    fn test_json_format_accepted() {
        let code = handle_hook(&args("ci", "json")).unwrap();
        assert_eq!(code, 0);
    }
}
