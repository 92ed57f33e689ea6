//! Persistent key-value store
//!
//! Everything the daemon remembers between runs (tokens, identity, the last
//! sync result, the badge) lives behind [`KeyValueStore`]. Callers receive the
//! store explicitly; [`MemoryStore`] backs tests and [`JsonFileStore`] backs
//! the CLI.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use fd_lock::RwLock;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{Result, SyncError};

/// Storage keys, camelCase to stay compatible with existing stores.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER_EMAIL: &str = "userEmail";
    pub const USER_NAME: &str = "userName";
    pub const LAST_SYNC_AT: &str = "lastSyncAt";
    pub const LAST_SYNC_STATUS: &str = "lastSyncStatus";
    pub const LAST_SYNC_ERROR: &str = "lastSyncError";
    pub const LAST_COOKIE_COUNTS: &str = "lastCookieCounts";
    pub const LAST_COOKIE_COUNT: &str = "lastCookieCount";
    pub const CREDENTIAL_ID: &str = "credentialId";
    pub const API_BASE_URL: &str = "apiBaseUrl";
    pub const BADGE_TEXT: &str = "badgeText";
    pub const BADGE_COLOR: &str = "badgeColor";
}

/// Durable get/set storage shared by every component.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write several keys at once; either all land or none do.
    fn set(&self, entries: Map<String, Value>) -> Result<()>;

    fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Convenience over [`KeyValueStore::set`] for `json!({...})` literals.
    fn set_json(&self, value: Value) -> Result<()> {
        match value {
            Value::Object(entries) => self.set(entries),
            other => Err(SyncError::Store(format!(
                "Expected a JSON object, got {}",
                other
            ))),
        }
    }

    /// String value of `key`; missing, null and empty all read as `None`.
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.get(key)? {
            Some(Value::String(value)) if !value.is_empty() => Some(value),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        })
    }
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Copy of everything currently stored
    pub fn snapshot(&self) -> Map<String, Value> {
        lock(&self.entries).clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, entries: Map<String, Value>) -> Result<()> {
        lock(&self.entries).extend(entries);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut entries = lock(&self.entries);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// A JSON object on disk, re-read on every access so that a CLI invocation
/// and a running daemon see each other's writes. Writes replace the file
/// atomically while holding an exclusive lock on a `<store>.lock` sibling,
/// so a read-modify-write from one process never drops another's change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SyncError::Store(format!("Failed to create store dir {:?}: {}", parent, e))
            })?;
        }
        let mut lock_name = path.file_name().map(OsString::from).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        let store = Self { path, lock_path };
        // Surface a corrupt file at startup rather than on first sync.
        store.read_all()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(entries) => Ok(entries),
            _ => Err(SyncError::Store(format!(
                "Store file {:?} does not hold a JSON object",
                self.path
            ))),
        }
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        let mut file = NamedTempFile::new_in(&dir)?;
        let body = serde_json::to_vec_pretty(entries)?;
        file.write_all(&body)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|e| SyncError::Store(format!("Failed to replace {:?}: {}", self.path, e)))?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        // The data file is swapped by rename, so the lock lives on a separate file.
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| {
                SyncError::Store(format!("Failed to open lock {:?}: {}", self.lock_path, e))
            })?;
        let mut file_lock = RwLock::new(lock_file);
        let _guard = file_lock.write().map_err(|e| {
            SyncError::Store(format!("Failed to lock {:?}: {}", self.lock_path, e))
        })?;

        let mut entries = self.read_all()?;
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, entries: Map<String, Value>) -> Result<()> {
        self.update(|current| current.extend(entries))
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        self.update(|current| {
            for key in keys {
                current.remove(*key);
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
