//! FileStore - durable key-value store in a single JSON file.

use super::KeyValueStore;
use crate::errors::{WalletError, WalletResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open `<root>/<app>/data/identity.json`, where root is
    /// `WALLET_SESSION_ROOT` or the platform local data dir.
    pub fn open(app: &str) -> WalletResult<Self> {
        Self::open_at(default_path(app))
    }

    pub fn open_at(path: impl Into<PathBuf>) -> WalletResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| WalletError::Storage(format!("identity read: {e}")))?;
            serde_json::from_str(&raw)
                .map_err(|e| WalletError::Storage(format!("identity json: {e}")))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> WalletResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries.lock().map_err(|_| WalletError::Storage("store lock".into()))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `entries` beside the target, then rename over it. A crash leaves
    /// either the old file or the new one, never a torn write.
    fn flush(&self, entries: &BTreeMap<String, String>) -> WalletResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WalletError::Storage(format!("identity mkdir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| WalletError::Storage(format!("identity json: {e}")))?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json)
            .map_err(|e| WalletError::Storage(format!("identity write: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| WalletError::Storage(format!("identity rename: {e}")))
    }

    /// Apply `change` to a copy, persist it, and only then swap it in.
    fn commit(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> WalletResult<()> {
        let mut entries = self.lock()?;
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> WalletResult<()> {
        self.commit(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        self.commit(|entries| entries.remove(key).is_some())
    }
}

fn default_path(app: &str) -> PathBuf {
    let root = std::env::var("WALLET_SESSION_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
    root.join(app).join("data").join("identity.json")
}
