//! Durable key-value storage for session identifiers.
//!
//! The session reads identifiers at bootstrap and writes whenever one
//! changes; nothing else touches storage. This is the explicit port that
//! replaces the browser's ad-hoc localStorage access.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

/// Storage key for the stable per-installation user id.
pub const USER_ID_KEY: &str = "user_id";
/// Storage key for the active run (conversation thread) id.
pub const RUN_ID_KEY: &str = "run_id";

/// Persistence port for session identifiers.
pub trait StateStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// JSON-file-backed store, kept fully in memory and rewritten on every
/// change. The value set is tiny (two identifiers).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("parsing state file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading state file {}", path.display()));
            }
        };
        Ok(Self { path, values })
    }

    /// Default state file location under the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatrelay/state.json")
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating state dir {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("writing state file {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        debug!("state store: {key} = {value}");
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(USER_ID_KEY), None);
        store.set(USER_ID_KEY, "u1").unwrap();
        store.set(RUN_ID_KEY, "r1").unwrap();
        store.set(RUN_ID_KEY, "r2").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(USER_ID_KEY).as_deref(), Some("u1"));
        assert_eq!(reopened.get(RUN_ID_KEY).as_deref(), Some("r2"));
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/state.json");
        let mut store = FileStore::open(&path).unwrap();
        store.set(USER_ID_KEY, "u1").unwrap();
        assert!(path.exists());
    }
}
