//! Command-line interface definitions.

pub mod commands;

use clap::{Args, Parser, Subcommand};

/// Batched agent execution core.
#[derive(Parser)]
#[command(name = "breakwater", version, about)]
pub struct Cli {
    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the commit-time contract verification hook
    Hook(HookArgs),

    /// Measure the drift rate of a shell command over repeated runs
    Drift(DriftArgs),
}

#[derive(Args)]
pub struct HookArgs {
    /// Hook mode: pre-commit, pre-push, ci, or manual
    #[arg(long, default_value = "pre-commit")]
    pub mode: String,

    /// Include the per-contract block in the report
    #[arg(long, default_value_t = false)]
    pub detailed_report: bool,

    /// Report format: text, json, or markdown
    #[arg(long, default_value = "text")]
    pub output_format: String,

    /// Exit nonzero when verification fails
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub block_on_failure: bool,
}

#[derive(Args)]
pub struct DriftArgs {
    /// Shell command to execute repeatedly
    pub command: String,

    /// Number of runs (engine default when omitted)
    #[arg(long)]
    pub runs: Option<usize>,

    /// Per-run timeout in seconds (engine default when omitted)
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_hook_defaults() {
        let cli = Cli::try_parse_from(["breakwater", "hook"]).unwrap();
        match cli.command {
            Commands::Hook(args) => {
                assert_eq!(args.mode, "pre-commit");
                assert!(!args.detailed_report);
                assert_eq!(args.output_format, "text");
                assert!(args.block_on_failure);
            }
            Commands::Drift(_) => panic!("expected hook command"),
        }
    }

    #[test]
    fn test_cli_parses_hook_overrides() {
        let cli = Cli::try_parse_from([
            "breakwater",
            "hook",
            "--mode",
            "ci",
            "--detailed-report",
            "--output-format",
            "json",
            "--block-on-failure",
            "false",
        ])
        .unwrap();
        match cli.command {
            Commands::Hook(args) => {
                assert_eq!(args.mode, "ci");
                assert!(args.detailed_report);
                assert_eq!(args.output_format, "json");
                assert!(!args.block_on_failure);
            }
            Commands::Drift(_) => panic!("expected hook command"),
        }
    }

    #[test]
    fn test_cli_parses_drift() {
        let cli =
            Cli::try_parse_from(["breakwater", "drift", "echo hi", "--runs", "7"]).unwrap();
        match cli.command {
            Commands::Drift(args) => {
                assert_eq!(args.command, "echo hi");
                assert_eq!(args.runs, Some(7));
                assert!(args.timeout_secs.is_none());
            }
            Commands::Hook(_) => panic!("expected drift command"),
        }
    }
}
