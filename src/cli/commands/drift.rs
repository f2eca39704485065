//! `breakwater drift` - measure a shell command's drift over repeated runs.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::cli::DriftArgs;
use crate::domain::models::{DriftConfig, Task};
use crate::domain::ports::{ExecutionOutput, TaskExecutor};
use crate::drift::{DriftDetector, DriftMeasurement};

/// Executor that runs the task prompt as a shell command and treats stdout
/// as the output under measurement.
struct ShellTaskExecutor;

#[async_trait]
impl TaskExecutor for ShellTaskExecutor {
    async fn execute(&self, task: &Task) -> Result<ExecutionOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&task.prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("spawning shell command")?;

        if output.status.success() {
            Ok(ExecutionOutput::ok(
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ))
        } else {
            Ok(ExecutionOutput::failed(format!(
                "command exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Measure and print; returns the process exit code (0 always, the
/// measurement is informational).
pub async fn handle_drift(args: &DriftArgs, config: &DriftConfig, json: bool) -> Result<i32> {
    let mut drift_config = config.clone();
    if let Some(timeout) = args.timeout_secs {
        drift_config.run_timeout_secs = timeout;
    }

    let detector = DriftDetector::from_config(Arc::new(ShellTaskExecutor), &drift_config);
    let task = Task::new("cli-drift", &args.command);
    let measurement = detector.measure_drift_rate(&task, args.runs).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&measurement)?);
    } else {
        println!("{}", render_text(&measurement, &args.command));
    }
    Ok(0)
}

fn render_text(measurement: &DriftMeasurement, command: &str) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = writeln!(out, "Drift measurement for: {command}");
    let _ = writeln!(out, "Runs:            {}", measurement.runs);
    let _ = writeln!(out, "Drift rate:      {:.2}%", measurement.drift_rate);
    let _ = writeln!(out, "Unique variants: {}", measurement.unique_variants);
    let _ = writeln!(
        out,
        "Deterministic:   {}",
        if measurement.is_deterministic { "yes" } else { "no" }
    );
    let _ = writeln!(out, "Confidence:      {:.2}", measurement.confidence);
    if !measurement.analysis.drift_sources.is_empty() {
        let _ = writeln!(
            out,
            "Drift sources:   {}",
            measurement.analysis.drift_sources.join(", ")
        );
    }
    for recommendation in &measurement.analysis.recommendations {
        let _ = writeln!(out, "Recommendation:  {recommendation}");
    }
    out
}
