//! Scripted mock runner plus the default validator and parser.
//!
//! The mock runner returns scripted outcomes keyed by prompt substring,
//! falling back to a generic success. Used by tests and local dry runs.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::models::AgentResponse;
use crate::domain::ports::{
    AgentRunResult, AgentRunner, AgentTaskRequest, ParseOutcome, PromptValidator, ResponseParser,
    RunnerFailure, ValidationOutcome,
};

/// Scripted outcome for a prompt pattern.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Succeed with this raw response text
    Success(String),
    /// Fail with this error message
    Failure(String),
}

/// Agent runner returning scripted outcomes.
#[derive(Default)]
pub struct MockAgentRunner {
    responses: RwLock<Vec<(String, MockResponse)>>,
    calls: RwLock<Vec<String>>,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an outcome for prompts containing `pattern`. Patterns are
    /// checked in registration order; first match wins.
    pub async fn script(&self, pattern: impl Into<String>, response: MockResponse) {
        self.responses.write().await.push((pattern.into(), response));
    }

    /// Prompts this runner has been asked to execute, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    async fn run_agent(&self, request: AgentTaskRequest) -> Result<AgentRunResult> {
        self.calls.write().await.push(request.prompt.clone());

        let scripted = {
            let responses = self.responses.read().await;
            responses
                .iter()
                .find(|(pattern, _)| request.prompt.contains(pattern))
                .map(|(_, response)| response.clone())
        };

        Ok(match scripted {
            Some(MockResponse::Failure(message)) => AgentRunResult {
                success: false,
                agent_response: None,
                provider_used: None,
                model_used: None,
                error: Some(RunnerFailure { message }),
            },
            Some(MockResponse::Success(text)) => AgentRunResult {
                success: true,
                agent_response: Some(text),
                provider_used: Some("mock".to_string()),
                model_used: Some("mock-model".to_string()),
                error: None,
            },
            None => AgentRunResult {
                success: true,
                agent_response: Some(
                    serde_json::to_string(&AgentResponse::summary_only("ok"))
                        .unwrap_or_else(|_| "{}".to_string()),
                ),
                provider_used: Some("mock".to_string()),
                model_used: Some("mock-model".to_string()),
                error: None,
            },
        })
    }
}

/// Validator requiring a non-empty prompt under a length cap.
pub struct BasicPromptValidator {
    max_length: usize,
}

impl Default for BasicPromptValidator {
    fn default() -> Self {
        Self {
            max_length: 100_000,
        }
    }
}

impl BasicPromptValidator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl PromptValidator for BasicPromptValidator {
    fn validate(&self, prompt: &str) -> ValidationOutcome {
        let mut errors = Vec::new();
        if prompt.trim().is_empty() {
            errors.push("prompt is empty".to_string());
        }
        if prompt.len() > self.max_length {
            errors.push(format!(
                "prompt is {} bytes, maximum is {}",
                prompt.len(),
                self.max_length
            ));
        }
        if errors.is_empty() {
            ValidationOutcome::ok()
        } else {
            ValidationOutcome::invalid(errors)
        }
    }
}

/// Parser accepting a JSON `AgentResponse`, falling back to wrapping plain
/// text into a summary-only success.
#[derive(Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseParser for JsonResponseParser {
    fn parse(&self, raw: &str) -> ParseOutcome {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ParseOutcome::failed("response was empty");
        }
        if trimmed.starts_with('{') {
            return match serde_json::from_str::<AgentResponse>(trimmed) {
                Ok(response) => ParseOutcome::parsed(response),
                Err(e) => ParseOutcome::failed(format!("invalid response JSON: {e}")),
            };
        }
        ParseOutcome::parsed(AgentResponse::summary_only(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_scripted_failure() {
        let runner = MockAgentRunner::new();
        runner
            .script("explode", MockResponse::Failure("boom".to_string()))
            .await;

        let result = runner
            .run_agent(AgentTaskRequest::new("please explode now"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.unwrap().message, "boom");

        let result = runner
            .run_agent(AgentTaskRequest::new("please behave"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(runner.calls().await.len(), 2);
    }

    #[test]
    fn test_basic_validator() {
        let validator = BasicPromptValidator::default();
        assert!(validator.validate("do something").valid);
        let outcome = validator.validate("   ");
        assert!(!outcome.valid);
        assert_eq!(outcome.errors, vec!["prompt is empty".to_string()]);

        let tight = BasicPromptValidator::new(5);
        assert!(!tight.validate("much too long").valid);
    }

    #[test]
    fn test_json_parser_accepts_structured_response() {
        let parser = JsonResponseParser::new();
        let outcome = parser.parse(
            r#"{"success": true, "summary": "built", "filesModified": ["src/a.rs"]}"#,
        );
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data.summary, "built");
        assert_eq!(data.files_modified, vec!["src/a.rs".to_string()]);
    }

    #[test]
    fn test_json_parser_wraps_plain_text() {
        let parser = JsonResponseParser::new();
        let outcome = parser.parse("all done");
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap().summary, "all done");
    }

    #[test]
    fn test_json_parser_rejects_bad_json() {
        let parser = JsonResponseParser::new();
        let outcome = parser.parse("{not json");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid response JSON"));
    }

    #[test]
    fn test_json_parser_rejects_empty() {
        let parser = JsonResponseParser::new();
        assert!(!parser.parse("  ").success);
    }
}
