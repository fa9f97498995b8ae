//! Key-value persistence behind an injected interface.
//!
//! Discovery and the CLI persist small records through [`KeyValueStore`];
//! tests use [`MemoryStore`], the binary uses [`FileStore`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{InsightsError, Result};

/// A string-keyed store of string values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read and deserialize `key`; `None` when absent or unparsable.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "ignoring unparsable stored value");
            None
        }
    }
}

/// Serialize `value` and store it under `key`.
pub fn set_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// Process-lifetime store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

// ── FileStore ─────────────────────────────────────────────────────────────────

/// All keys in one JSON object file, rewritten atomically on every change.
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// `~/.repo-insights/state.json`.
    pub fn default_path() -> PathBuf {
        Self::default_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn default_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".repo-insights").join("state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(InsightsError::FileRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "state file unparsable; starting empty");
            BTreeMap::new()
        }))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;

        // Write to a temp file then rename for atomicity.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        match self.read_all() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                warn!(error = %e, "state file unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_json_helpers_round_trip_list() {
        let store = MemoryStore::new();
        set_json(&store, "ids", &vec!["api", "web"]).unwrap();
        let ids: Vec<String> = get_json(&store, "ids").unwrap();
        assert_eq!(ids, vec!["api", "web"]);
    }

    #[test]
    fn test_get_json_ignores_garbage() {
        let store = MemoryStore::new();
        store.set("ids", "not json").unwrap();
        assert!(get_json::<Vec<String>>(&store, "ids").is_none());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let tmp = TempDir::new().expect("tempdir");
        let path = FileStore::default_path_in(tmp.path());

        FileStore::new(&path).set("a", "1").unwrap();
        FileStore::new(&path).set("b", "2").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").as_deref(), Some("1"));
        assert_eq!(reopened.get("b").as_deref(), Some("2"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_remove() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FileStore::new(FileStore::default_path_in(tmp.path()));
        store.set("a", "1").unwrap();
        store.remove("a").unwrap();
        assert!(store.get("a").is_none());
        // Removing a missing key is not an error.
        store.remove("missing").unwrap();
    }

    #[test]
    fn test_file_store_missing_or_corrupt_file_reads_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("state.json");
        let store = FileStore::new(&path);
        assert!(store.get("a").is_none());

        std::fs::write(&path, "{broken").unwrap();
        assert!(store.get("a").is_none());
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_file_store_refuses_to_overwrite_unreadable_state() {
        let tmp = TempDir::new().expect("tempdir");
        let path = FileStore::default_path_in(tmp.path());
        std::fs::create_dir_all(&path).unwrap();

        let store = FileStore::new(&path);
        assert!(store.get("a").is_none());
        assert!(matches!(
            store.set("a", "1"),
            Err(InsightsError::FileRead { .. })
        ));
    }
}
