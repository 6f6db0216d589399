//! Persistence seam for learning state.
//!
//! The store is a best-effort collaborator: it is read once at startup and
//! written opportunistically after updates. It is never required to be
//! durable before the next decision.

use crate::routing::learner::LearningState;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key-value style persistence for [`LearningState`].
pub trait LearningStore: Send + Sync {
    /// Load the persisted state, if any.
    fn load(&self) -> anyhow::Result<Option<LearningState>>;

    /// Persist the current state.
    fn save(&self, state: &LearningState) -> anyhow::Result<()>;
}

/// JSON file store for standalone hosts.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl LearningStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<Option<LearningState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let state = serde_json::from_slice(&bytes)?;
        Ok(Some(state))
    }

    fn save(&self, state: &LearningState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory store; the default when no persistence is configured and the
/// standard test double.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<LearningState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LearningStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<LearningState>> {
        Ok(self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("store poisoned"))?
            .clone())
    }

    fn save(&self, state: &LearningState) -> anyhow::Result<()> {
        *self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("store poisoned"))? = Some(state.clone());
        Ok(())
    }
}
