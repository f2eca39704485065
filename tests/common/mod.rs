//! Shared test fixtures: collaborator wiring for orchestration tests.

use std::sync::Arc;

use breakwater::infrastructure::{
    BasicPromptValidator, InMemoryStore, JsonResponseParser, MockAgentRunner,
};
use breakwater::services::{ResourceManager, WaveOrchestrator};

/// Fully wired orchestrator over the mock runner and in-memory store.
#[allow(dead_code)] // fields are exercised by different test binaries
pub struct TestHarness {
    pub orchestrator: WaveOrchestrator,
    pub runner: Arc<MockAgentRunner>,
    pub memory: Arc<InMemoryStore>,
    pub resources: Arc<ResourceManager>,
}

/// Build a harness with the given concurrency cap.
pub fn harness(max_concurrent: usize) -> TestHarness {
    let runner = Arc::new(MockAgentRunner::new());
    let memory = Arc::new(InMemoryStore::new());
    let resources =
        Arc::new(ResourceManager::new(max_concurrent).with_memory_store(memory.clone()));

    let orchestrator = WaveOrchestrator::new(
        resources.clone(),
        runner.clone(),
        Arc::new(BasicPromptValidator::default()),
        Arc::new(JsonResponseParser::new()),
        memory.clone(),
    );

    TestHarness {
        orchestrator,
        runner,
        memory,
        resources,
    }
}
