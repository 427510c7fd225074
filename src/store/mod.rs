//! Persisted identity records.
//!
//! A flat durable key-value store (the browser's local storage in a web host,
//! a JSON file natively). Each adapter gets an [`IdentityRecord`] scoped to its
//! own keys, so adapters never clobber each other:
//!
//! | Key | Owner | Contents |
//! |-----|-------|----------|
//! | `{source}.publicKey` | every adapter | Account id of the last session |
//! | `{source}.connectionMethod` | every adapter | How it was established |
//! | `legacy-popup.transientSecret` | legacy-popup only | Provider secret during handoff; erased once consumed |

#[cfg(feature = "native")]
mod file;

#[cfg(feature = "native")]
pub use file::FileStore;

use crate::errors::{WalletError, WalletResult};
use crate::session::{ConnectionMethod, ConnectionSource};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::Zeroizing;

pub const PUBLIC_KEY: &str = "publicKey";
pub const CONNECTION_METHOD: &str = "connectionMethod";
pub const TRANSIENT_SECRET: &str = "transientSecret";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> WalletResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> WalletResult<()>;
    fn remove(&self, key: &str) -> WalletResult<()>;
}

/// In-process store (tests, hosts without durable storage).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.keys().cloned().collect()).unwrap_or_default()
    }

    fn lock(&self) -> WalletResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries.lock().map_err(|_| WalletError::Storage("store lock".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> WalletResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> WalletResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Identity persisted by one adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedIdentity {
    pub public_key: String,
    pub method: ConnectionMethod,
}

/// One adapter's view of the durable store. Writes only touch keys prefixed
/// with the owning source.
#[derive(Clone)]
pub struct IdentityRecord {
    store: Arc<dyn KeyValueStore>,
    owner: ConnectionSource,
}

impl IdentityRecord {
    pub fn new(store: Arc<dyn KeyValueStore>, owner: ConnectionSource) -> Self {
        Self { store, owner }
    }

    pub fn owner(&self) -> ConnectionSource {
        self.owner
    }

    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.owner.as_str(), name)
    }

    pub fn load(&self) -> WalletResult<Option<PersistedIdentity>> {
        let public_key = self.store.get(&self.key(PUBLIC_KEY))?;
        let method = self.store.get(&self.key(CONNECTION_METHOD))?;
        Ok(match (public_key, method.as_deref().and_then(ConnectionMethod::from_str)) {
            (Some(public_key), Some(method)) if method.source() == self.owner => {
                Some(PersistedIdentity { public_key, method })
            }
            _ => None,
        })
    }

    pub fn save(&self, public_key: &str, method: ConnectionMethod) -> WalletResult<()> {
        if method.source() != self.owner {
            return Err(WalletError::InvalidRequest(format!(
                "{} cannot persist a {} session",
                self.owner,
                method.as_str()
            )));
        }
        self.store.set(&self.key(PUBLIC_KEY), public_key)?;
        self.store.set(&self.key(CONNECTION_METHOD), method.as_str())
    }

    /// Park a provider secret for a handoff. Only the legacy popup flow may.
    pub fn stash_secret(&self, secret: &str) -> WalletResult<()> {
        if self.owner != ConnectionSource::LegacyPopup {
            return Err(WalletError::InvalidRequest(format!(
                "{} may not persist secrets",
                self.owner
            )));
        }
        self.store.set(&self.key(TRANSIENT_SECRET), secret)
    }

    /// Read and erase the parked secret.
    pub fn take_secret(&self) -> WalletResult<Option<Zeroizing<String>>> {
        if self.owner != ConnectionSource::LegacyPopup {
            return Ok(None);
        }
        let key = self.key(TRANSIENT_SECRET);
        let secret = self.store.get(&key)?.map(Zeroizing::new);
        if secret.is_some() {
            self.store.remove(&key)?;
        }
        Ok(secret)
    }

    /// Best-effort removal of everything this adapter persisted.
    pub fn clear(&self) {
        for name in [PUBLIC_KEY, CONNECTION_METHOD, TRANSIENT_SECRET] {
            if let Err(e) = self.store.remove(&self.key(name)) {
                tracing::warn!("{}: failed to clear {}: {}", self.owner, name, e);
            }
        }
    }
}

/// Persisted identity of the highest-precedence adapter that has one.
pub fn restore_identity(
    store: &Arc<dyn KeyValueStore>,
    precedence: &[ConnectionSource],
) -> Option<PersistedIdentity> {
    precedence.iter().find_map(|source| {
        IdentityRecord::new(store.clone(), *source)
            .load()
            .map_err(|e| tracing::warn!("{}: unreadable identity record: {}", source, e))
            .ok()
            .flatten()
    })
}
