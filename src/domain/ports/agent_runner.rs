//! Agent runner port - interface for the external agent backend.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Wire-versioned request handed to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTaskRequest {
    /// Protocol version; currently always "1.0"
    pub version: String,
    pub prompt: String,
}

impl AgentTaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            prompt: prompt.into(),
        }
    }
}

/// Failure detail reported by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerFailure {
    pub message: String,
}

/// Outcome of one runner invocation.
///
/// `agent_response` is the raw text to hand to the response parser;
/// `error` is populated when `success` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunnerFailure>,
}

/// Trait for agent runner implementations.
///
/// An `Err` from `run_agent` is an infrastructure failure (process spawn,
/// transport); an unsuccessful `AgentRunResult` is the runner reporting
/// that the agent itself failed.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_agent(&self, request: AgentTaskRequest) -> Result<AgentRunResult>;
}
