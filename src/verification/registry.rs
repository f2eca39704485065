//! Process-wide contract registry.
//!
//! Entries are inserted once and logically immutable; an update is a new
//! contract under a new id. Queries never expose mutable access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::error::RegistryError;

use super::contract::AgentContract;

/// Set of contracts keyed by id.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: RwLock<HashMap<String, Arc<AgentContract>>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a contract. Ids are unique; a duplicate insert fails.
    pub fn register(&self, contract: AgentContract) -> Result<(), RegistryError> {
        let mut contracts = self.contracts.write().unwrap_or_else(|e| e.into_inner());
        if contracts.contains_key(&contract.id) {
            return Err(RegistryError::DuplicateContract(contract.id));
        }
        contracts.insert(contract.id.clone(), Arc::new(contract));
        Ok(())
    }

    /// Look up a contract by id.
    pub fn get(&self, id: &str) -> Option<Arc<AgentContract>> {
        let contracts = self.contracts.read().unwrap_or_else(|e| e.into_inner());
        contracts.get(id).cloned()
    }

    /// Whether a contract with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        let contracts = self.contracts.read().unwrap_or_else(|e| e.into_inner());
        contracts.contains_key(id)
    }

    /// Whether any contract carries this display name.
    pub fn contains_name(&self, name: &str) -> bool {
        let contracts = self.contracts.read().unwrap_or_else(|e| e.into_inner());
        contracts.values().any(|c| c.name == name)
    }

    /// All contracts, ordered by id for deterministic iteration.
    pub fn all(&self) -> Vec<Arc<AgentContract>> {
        let contracts = self.contracts.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Arc<AgentContract>> = contracts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Contracts registered for a task type.
    pub fn by_task_type(&self, task_type: &str) -> Vec<Arc<AgentContract>> {
        self.all()
            .into_iter()
            .filter(|c| c.task_type == task_type)
            .collect()
    }

    /// Contracts carrying a tag.
    pub fn by_tag(&self, tag: &str) -> Vec<Arc<AgentContract>> {
        self.all()
            .into_iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Enabled contracts only.
    pub fn enabled(&self) -> Vec<Arc<AgentContract>> {
        self.all().into_iter().filter(|c| c.enabled).collect()
    }

    pub fn len(&self) -> usize {
        let contracts = self.contracts.read().unwrap_or_else(|e| e.into_inner());
        contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
