//! Persistence backends for learned value tables.
//!
//! A store is an opaque byte sink keyed by a path-like identifier. The table
//! encoding lives in [`ValueTable`](crate::ValueTable); stores never look
//! inside the bytes.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::StoreError;

/// Trait for value-table persistence.
///
/// Implementations must be thread-safe: each agent saves from its own
/// worker thread.
pub trait ValueStore: Send + Sync {
    /// Stores `bytes` under `id`, replacing any previous content.
    fn save(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Loads the bytes stored under `id`; `Ok(None)` when nothing is stored.
    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Stores each table as a file below a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. Nothing is touched until the first save.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Full path of the file backing `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl ValueStore for FileStore {
    fn save(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(id);
        let unwritable = |e: std::io::Error| StoreError::Unwritable {
            target: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(unwritable)?;
        }
        // Write-then-rename so a crash never leaves a truncated table behind
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, bytes).map_err(unwritable)?;
        std::fs::rename(&staging, &path).map_err(unwritable)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Value table written");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(id);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Sled-based persistent store.
///
/// Uses an embedded key-value database for durability; one key per table.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create a temporary store that is removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl ValueStore for SledStore {
    fn save(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.db.insert(id.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(id.as_bytes())?.map(|ivec| ivec.to_vec()))
    }
}

/// In-process store, mainly for tests and parameter sweeps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ValueStore for MemoryStore {
    fn save(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }
}
