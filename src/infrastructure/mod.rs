//! Infrastructure: configuration, logging, and the shipped port
//! implementations (file state store, in-memory memory store, mock runner).

pub mod config;
pub mod logging;
pub mod memory;
pub mod runner;
pub mod state;

pub use config::ConfigLoader;
pub use memory::InMemoryStore;
pub use runner::{BasicPromptValidator, JsonResponseParser, MockAgentRunner};
pub use state::FileStateStore;
