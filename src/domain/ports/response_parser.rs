//! Response parser port - turns raw agent text into a structured response.

use crate::domain::models::AgentResponse;

/// Outcome of parsing one raw response.
///
/// `data` is populated iff `success` is true; `error` otherwise.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub success: bool,
    pub data: Option<AgentResponse>,
    pub error: Option<String>,
}

impl ParseOutcome {
    pub fn parsed(data: AgentResponse) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for response parser implementations. Parsing may be synchronous;
/// callers treat it as CPU-bound work.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: &str) -> ParseOutcome;
}
