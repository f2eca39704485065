//! In-memory scoped event and artifact store.
//!
//! Keeps the full scope tree in process memory. Budget utilization is a
//! settable gauge so tests and local runs can exercise memory-pressure
//! paths without a real accounting backend.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{
    BudgetUtilization, MemoryEvent, MemoryMetrics, MemoryStore, ScopeId, ScopeLevel, ScopeSpec,
};

/// One scope's recorded state.
#[derive(Debug, Clone)]
pub struct ScopeRecord {
    pub goal: String,
    pub level: ScopeLevel,
    pub events: Vec<MemoryEvent>,
    pub artifacts: HashMap<String, Value>,
    pub summary: Option<String>,
    pub open: bool,
}

#[derive(Default)]
struct Inner {
    scopes: HashMap<ScopeId, ScopeRecord>,
    order: Vec<ScopeId>,
}

/// In-memory memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    task_utilization: Arc<RwLock<f64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task-scope budget utilization gauge (percent).
    pub async fn set_task_utilization(&self, percent: f64) {
        *self.task_utilization.write().await = percent;
    }

    /// Snapshot of a scope, if it exists.
    pub async fn scope(&self, id: ScopeId) -> Option<ScopeRecord> {
        self.inner.read().await.scopes.get(&id).cloned()
    }

    /// All scopes in creation order.
    pub async fn scopes(&self) -> Vec<(ScopeId, ScopeRecord)> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.scopes.get(id).map(|record| (*id, record.clone())))
            .collect()
    }

    /// Event type labels across all scopes, in insertion order per scope.
    pub async fn event_types(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.scopes.get(id))
            .flat_map(|record| record.events.iter().map(|e| e.event_type.clone()))
            .collect()
    }

    /// Ids of scopes still open.
    pub async fn open_scopes(&self) -> Vec<ScopeId> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter(|id| inner.scopes.get(*id).is_some_and(|s| s.open))
            .copied()
            .collect()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn create_scope(&self, spec: ScopeSpec) -> Result<ScopeId> {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner.scopes.insert(
            id,
            ScopeRecord {
                goal: spec.goal,
                level: spec.level,
                events: Vec::new(),
                artifacts: HashMap::new(),
                summary: None,
                open: true,
            },
        );
        inner.order.push(id);
        debug!(scope = %id, level = ?spec.level, "Scope opened");
        Ok(id)
    }

    async fn add_event(&self, scope: ScopeId, event: MemoryEvent) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .scopes
            .get_mut(&scope)
            .ok_or_else(|| anyhow::anyhow!("unknown scope {scope}"))?;
        if !record.open {
            anyhow::bail!("scope {scope} is closed");
        }
        record.events.push(event);
        Ok(())
    }

    async fn set_artifact(&self, scope: ScopeId, key: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .scopes
            .get_mut(&scope)
            .ok_or_else(|| anyhow::anyhow!("unknown scope {scope}"))?;
        if !record.open {
            anyhow::bail!("scope {scope} is closed");
        }
        record.artifacts.insert(key.to_string(), value);
        Ok(())
    }

    async fn metrics(&self) -> Result<MemoryMetrics> {
        Ok(MemoryMetrics {
            budget_utilization: BudgetUtilization {
                task: *self.task_utilization.read().await,
            },
        })
    }

    async fn close_scope(&self, scope: ScopeId, summary: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .scopes
            .get_mut(&scope)
            .ok_or_else(|| anyhow::anyhow!("unknown scope {scope}"))?;
        record.open = false;
        record.summary = Some(summary.to_string());
        debug!(scope = %scope, "Scope closed");
        Ok(())
    }
}
