//! Append-only decision store.
//!
//! Every freshly computed [`ConsensusResult`] can be recorded here so the
//! report generator and statistics see the same decisions across restarts.
//! Stores have an explicit lifecycle: `open` at startup, `close` at shutdown.
//! After `close` every operation fails with [`StoreError::Closed`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::cache::CacheKey;
use crate::engine::ConsensusResult;
use crate::error::ConsensusError;

/// Error type for decision store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Decision already recorded for {0}")]
    Duplicate(CacheKey),

    #[error("Store is closed")]
    Closed,

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for decision store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ConsensusError {
    fn from(err: StoreError) -> Self {
        ConsensusError::Store(err.to_string())
    }
}

/// Persistence seam for consensus decisions.
pub trait DecisionStore: Send + Sync {
    /// Record a decision. Fails with `Duplicate` if its key is already present.
    fn append(&self, result: &ConsensusResult) -> StoreResult<()>;

    fn get(&self, key: &CacheKey) -> StoreResult<Option<ConsensusResult>>;

    /// All decisions in append order.
    fn list(&self) -> StoreResult<Vec<ConsensusResult>>;

    /// Flush and release. Idempotent.
    fn close(&self) -> StoreResult<()>;
}

/// Shared reference to a decision store
pub type SharedDecisionStore = Arc<dyn DecisionStore>;

/// Decisions held in memory; `None` once closed.
type Ledger = RwLock<Option<Vec<ConsensusResult>>>;

fn check_duplicate(entries: &[ConsensusResult], result: &ConsensusResult) -> StoreResult<()> {
    let key = result.key();
    if entries.iter().any(|existing| existing.key() == key) {
        return Err(StoreError::Duplicate(key));
    }
    Ok(())
}

fn find(entries: &[ConsensusResult], key: &CacheKey) -> Option<ConsensusResult> {
    entries.iter().find(|r| &r.key() == key).cloned()
}

/// Volatile store for tests and one-shot runs.
pub struct MemoryStore {
    entries: Ledger,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(Vec::new())),
        }
    }

    pub fn shared(self) -> SharedDecisionStore {
        Arc::new(self)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionStore for MemoryStore {
    fn append(&self, result: &ConsensusResult) -> StoreResult<()> {
        let mut guard = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let entries = guard.as_mut().ok_or(StoreError::Closed)?;
        check_duplicate(entries, result)?;
        entries.push(result.clone());
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<ConsensusResult>> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let entries = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(find(entries, key))
    }

    fn list(&self) -> StoreResult<Vec<ConsensusResult>> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        guard.as_ref().cloned().ok_or(StoreError::Closed)
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        *guard = None;
        Ok(())
    }
}

/// Decisions persisted as one pretty-printed JSON array.
///
/// Each append rewrites the file through a temporary sibling and a rename, so
/// readers never observe a half-written file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Ledger,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            load(&path)?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let empty: Vec<ConsensusResult> = Vec::new();
            write_atomic(&path, &empty)?;
            empty
        };
        Ok(Self::opened(path, entries))
    }

    /// Open a store that must already exist. Nothing is created on disk.
    pub fn open_existing(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = load(&path)?;
        Ok(Self::opened(path, entries))
    }

    fn opened(path: PathBuf, entries: Vec<ConsensusResult>) -> Self {
        info!(path = %path.display(), decisions = entries.len(), "Decision store opened");
        Self {
            path,
            entries: RwLock::new(Some(entries)),
        }
    }

    pub fn shared(self) -> SharedDecisionStore {
        Arc::new(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load(path: &Path) -> StoreResult<Vec<ConsensusResult>> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .map_err(|e| StoreError::Deserialization(format!("{}: {}", path.display(), e)))
}

fn write_atomic(path: &Path, entries: &[ConsensusResult]) -> StoreResult<()> {
    let bytes =
        serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl DecisionStore for JsonFileStore {
    fn append(&self, result: &ConsensusResult) -> StoreResult<()> {
        let mut guard = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let entries = guard.as_mut().ok_or(StoreError::Closed)?;
        check_duplicate(entries, result)?;
        entries.push(result.clone());
        if let Err(e) = write_atomic(&self.path, entries) {
            entries.pop();
            return Err(e);
        }
        debug!(key = %result.key(), path = %self.path.display(), "Decision recorded");
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<ConsensusResult>> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let entries = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(find(entries, key))
    }

    fn list(&self) -> StoreResult<Vec<ConsensusResult>> {
        let guard = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        guard.as_ref().cloned().ok_or(StoreError::Closed)
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(entries) = guard.take() {
            write_atomic(&self.path, &entries)?;
            info!(path = %self.path.display(), decisions = entries.len(), "Decision store closed");
        }
        Ok(())
    }
}
