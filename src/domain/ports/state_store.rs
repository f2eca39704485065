//! State store port - durable checkpoint persistence by name.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{StepCheckpoint, WaveState};

/// Trait for checkpoint persistence implementations.
///
/// Readers and writers coordinate through the store's atomic write
/// semantics; the core treats names as opaque.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the wave checkpoint saved under `name`, if any.
    async fn load_checkpoint(&self, name: &str) -> Result<Option<WaveState>>;

    /// Save (replace) the wave checkpoint under `name`.
    async fn save_checkpoint(&self, name: &str, state: &WaveState) -> Result<()>;

    /// Load the step checkpoint saved under `name`, if any.
    async fn load_step_checkpoint(&self, name: &str) -> Result<Option<StepCheckpoint>>;

    /// Save (replace) the step checkpoint under `name`.
    async fn save_step_checkpoint(&self, name: &str, checkpoint: &StepCheckpoint) -> Result<()>;

    /// All step checkpoints currently stored.
    async fn list_step_checkpoints(&self) -> Result<Vec<StepCheckpoint>>;
}
