//! Mock runner and the basic validator/parser implementations.

mod mock;

pub use mock::{BasicPromptValidator, JsonResponseParser, MockAgentRunner, MockResponse};
