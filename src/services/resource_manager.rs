//! Agent-slot accounting and memory-aware wave sizing.
//!
//! The manager is shared read-mostly; its counters are modified only through
//! `acquire_slot` / `release_slot`, so callers never mutate state directly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::ports::MemoryStore;

/// Task-scope utilization above which the wave size is halved.
const HIGH_UTILIZATION_PCT: f64 = 80.0;

/// Task-scope utilization above which the wave size is scaled to 75 %.
const ELEVATED_UTILIZATION_PCT: f64 = 60.0;

/// Gates agent slots by a concurrency cap and memory-budget signals.
pub struct ResourceManager {
    max_concurrent: AtomicUsize,
    active: AtomicUsize,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ResourceManager {
    /// Create a manager with the given concurrency cap (floored at 1).
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: AtomicUsize::new(max_concurrent.max(1)),
            active: AtomicUsize::new(0),
            memory: None,
        }
    }

    /// Attach a memory store so `compute_wave_size` can read budget
    /// utilization. Without one, memory signals are ignored.
    pub fn with_memory_store(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Current concurrency cap. Always positive.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Change the concurrency cap at runtime (floored at 1). Already-held
    /// slots are unaffected.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        self.max_concurrent
            .store(max_concurrent.max(1), Ordering::SeqCst);
    }

    /// Number of slots currently held.
    pub fn active_agents(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// True iff spawning one more agent right now would not exceed capacity.
    /// Never suspends and has no side effects.
    pub fn can_spawn_agent(&self) -> bool {
        self.active.load(Ordering::SeqCst) < self.max_concurrent()
    }

    /// Try to take one slot. Returns false without waiting when at capacity.
    pub fn acquire_slot(&self) -> bool {
        let max = self.max_concurrent();
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < max).then_some(active + 1)
            })
            .is_ok()
    }

    /// Return a previously acquired slot.
    pub fn release_slot(&self) {
        let previous = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                active.checked_sub(1)
            });
        if previous.is_err() {
            warn!("release_slot called with no slots held");
        }
    }

    /// Effective wave size for the next wave.
    ///
    /// Base is the concurrency cap. When memory budgets are enabled and the
    /// store reports task-scope utilization above 80 % the base is halved;
    /// above 60 % it is scaled to 75 %. The result is always at least 1.
    /// A metrics failure degrades to the unscaled base.
    pub async fn compute_wave_size(&self, use_memory_budgets: bool) -> usize {
        let base = self.max_concurrent();
        if !use_memory_budgets {
            return base;
        }
        let Some(memory) = &self.memory else {
            return base;
        };

        let utilization = match memory.metrics().await {
            Ok(metrics) => metrics.budget_utilization.task,
            Err(e) => {
                warn!(error = %e, "Memory metrics unavailable, using unscaled wave size");
                return base;
            }
        };

        let scaled = if utilization > HIGH_UTILIZATION_PCT {
            (base as f64 * 0.5).floor() as usize
        } else if utilization > ELEVATED_UTILIZATION_PCT {
            (base as f64 * 0.75).floor() as usize
        } else {
            base
        };

        let wave_size = scaled.max(1);
        debug!(
            utilization_pct = utilization,
            base, wave_size, "Computed wave size"
        );
        wave_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        BudgetUtilization, MemoryEvent, MemoryMetrics, ScopeId, ScopeSpec,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use uuid::Uuid;

    struct FixedMetricsStore {
        task_utilization: f64,
        fail: bool,
    }

    #[async_trait]
    impl MemoryStore for FixedMetricsStore {
        async fn create_scope(&self, _spec: ScopeSpec) -> Result<ScopeId> {
            Ok(Uuid::new_v4())
        }

        async fn add_event(&self, _scope: ScopeId, _event: MemoryEvent) -> Result<()> {
            Ok(())
        }

        async fn set_artifact(&self, _scope: ScopeId, _key: &str, _value: Value) -> Result<()> {
            Ok(())
        }

        async fn metrics(&self) -> Result<MemoryMetrics> {
            if self.fail {
                anyhow::bail!("metrics unavailable");
            }
            Ok(MemoryMetrics {
                budget_utilization: BudgetUtilization {
                    task: self.task_utilization,
                },
            })
        }

        async fn close_scope(&self, _scope: ScopeId, _summary: &str) -> Result<()> {
            Ok(())
        }
    }

    fn manager_with_utilization(max: usize, utilization: f64) -> ResourceManager {
        ResourceManager::new(max).with_memory_store(Arc::new(FixedMetricsStore {
            task_utilization: utilization,
            fail: false,
        }))
    }

    #[test]
    fn test_slot_accounting() {
        let manager = ResourceManager::new(2);
        assert!(manager.can_spawn_agent());
        assert!(manager.acquire_slot());
        assert!(manager.acquire_slot());
        assert!(!manager.can_spawn_agent());
        assert!(!manager.acquire_slot());

        manager.release_slot();
        assert!(manager.can_spawn_agent());
        assert_eq!(manager.active_agents(), 1);
    }

    #[test]
    fn test_release_without_acquire_is_harmless() {
        let manager = ResourceManager::new(1);
        manager.release_slot();
        assert_eq!(manager.active_agents(), 0);
    }

    #[test]
    fn test_max_concurrent_floor() {
        let manager = ResourceManager::new(0);
        assert_eq!(manager.max_concurrent(), 1);
        manager.set_max_concurrent(0);
        assert_eq!(manager.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_wave_size_without_memory_store() {
        let manager = ResourceManager::new(8);
        assert_eq!(manager.compute_wave_size(true).await, 8);
        assert_eq!(manager.compute_wave_size(false).await, 8);
    }

    #[tokio::test]
    async fn test_wave_size_scaling_bands() {
        // Below 60 %: unscaled
        assert_eq!(
            manager_with_utilization(8, 50.0).compute_wave_size(true).await,
            8
        );
        // 60 % exactly is not "above"
        assert_eq!(
            manager_with_utilization(8, 60.0).compute_wave_size(true).await,
            8
        );
        // Above 60 %: 75 %
        assert_eq!(
            manager_with_utilization(8, 61.0).compute_wave_size(true).await,
            6
        );
        // Above 80 %: halved
        assert_eq!(
            manager_with_utilization(8, 81.0).compute_wave_size(true).await,
            4
        );
        // Over 100 % behaves like the high band
        assert_eq!(
            manager_with_utilization(8, 130.0).compute_wave_size(true).await,
            4
        );
    }

    #[tokio::test]
    async fn test_wave_size_floors_at_one() {
        assert_eq!(
            manager_with_utilization(1, 95.0).compute_wave_size(true).await,
            1
        );
    }

    #[tokio::test]
    async fn test_wave_size_ignores_memory_when_disabled() {
        assert_eq!(
            manager_with_utilization(8, 95.0)
                .compute_wave_size(false)
                .await,
            8
        );
    }

    #[tokio::test]
    async fn test_wave_size_metrics_failure_degrades_to_base() {
        let manager = ResourceManager::new(6).with_memory_store(Arc::new(FixedMetricsStore {
            task_utilization: 0.0,
            fail: true,
        }));
        assert_eq!(manager.compute_wave_size(true).await, 6);
    }
}
