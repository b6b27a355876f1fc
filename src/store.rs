//! Durable key-value storage collaborator.
//!
//! The trip record and the coordinate ledger are persisted through this
//! interface as opaque string blobs. The production implementation keeps one
//! file per key and makes every write durable before returning, so a caller
//! that sees `Ok` can crash immediately afterwards and still find the value
//! on the next read.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;

/// String-keyed blob store with atomic read-after-write semantics.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed store: one file per key under the data directory.
///
/// Writes go through a temp file in the same directory, are fsynced, then
/// renamed over the target. A torn write can therefore never be observed.
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Open (and create if needed) a store rooted at the default data
    /// directory, `$XDG_DATA_HOME/odometr` or `~/.local/share/odometr`.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .context("Could not determine data directory")?
            .join("odometr");
        Self::open(dir)
    }

    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal identifiers but may embed ids with path-hostile
        // characters; encode the few that matter on a filesystem.
        let safe: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read store entry {}", path.display()))
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary file for durable write")?;
        tmp.write_all(value.as_bytes())
            .context("Failed to write store entry")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync store entry to disk")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist store entry {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove store entry {}", path.display()))
            }
        }
    }
}

/// In-memory store for tests.
#[cfg(any(test, feature = "testing-support"))]
pub struct MemoryKvStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_read_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();

        assert_eq!(store.get("missing").unwrap(), None);
        store.set("trip", "{\"id\":1}").unwrap();
        assert_eq!(store.get("trip").unwrap().as_deref(), Some("{\"id\":1}"));

        store.set("trip", "{\"id\":2}").unwrap();
        assert_eq!(store.get("trip").unwrap().as_deref(), Some("{\"id\":2}"));

        store.remove("trip").unwrap();
        assert_eq!(store.get("trip").unwrap(), None);
        // Removing a missing key is not an error
        store.remove("trip").unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
            store.set("k", "v").unwrap();
        }
        let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_sanitizes_path_separators() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
        store.set("ledger/rider-1", "x").unwrap();
        assert_eq!(store.get("ledger/rider-1").unwrap().as_deref(), Some("x"));
        // The blob landed inside the store directory, not a subdirectory
        assert!(dir.path().join("ledger_rider-1.json").exists());
    }
}
