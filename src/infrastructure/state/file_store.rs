//! JSON checkpoint files under a configurable directory.
//!
//! Writes go to a temp file in the same directory followed by an atomic
//! rename, so readers never observe a torn checkpoint. File names derive
//! from the checkpoint name with non-filename characters replaced.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::domain::models::{StepCheckpoint, WaveState};
use crate::domain::ports::StateStore;

const WAVE_SUFFIX: &str = ".wave.json";
const STEP_SUFFIX: &str = ".step.json";

/// Checkpoint store writing JSON files under `dir`.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str, suffix: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}{suffix}"))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating checkpoint dir {}", self.dir.display()))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        debug!(path = %path.display(), "Checkpoint saved");
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_checkpoint(&self, name: &str) -> Result<Option<WaveState>> {
        self.read_json(&self.path_for(name, WAVE_SUFFIX)).await
    }

    async fn save_checkpoint(&self, name: &str, state: &WaveState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state).context("serializing wave checkpoint")?;
        self.write_atomic(&self.path_for(name, WAVE_SUFFIX), &bytes)
            .await
    }

    async fn load_step_checkpoint(&self, name: &str) -> Result<Option<StepCheckpoint>> {
        self.read_json(&self.path_for(name, STEP_SUFFIX)).await
    }

    async fn save_step_checkpoint(&self, name: &str, checkpoint: &StepCheckpoint) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint).context("serializing step checkpoint")?;
        self.write_atomic(&self.path_for(name, STEP_SUFFIX), &bytes)
            .await
    }

    async fn list_step_checkpoints(&self) -> Result<Vec<StepCheckpoint>> {
        let mut checkpoints = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(checkpoints),
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", self.dir.display()));
            }
        };
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(STEP_SUFFIX))
            {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            if let Some(checkpoint) = self.read_json::<StepCheckpoint>(&path).await? {
                checkpoints.push(checkpoint);
            }
        }
        Ok(checkpoints)
    }
}
