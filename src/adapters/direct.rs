//! Direct wallet adapter: a browser wallet extension, or a manually entered
//! account id when no extension is available (read-only).

use super::{AdapterCore, AdapterStatus, ProviderAdapter, RetryPolicy};
use crate::clock::Clock;
use crate::errors::{WalletError, WalletResult};
use crate::identity::is_account_id;
use crate::session::{ConnectionMethod, ConnectionSource};
use crate::store::{IdentityRecord, KeyValueStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Wallet browser extension. Errors the extension reports inline come back
/// as `Err(WalletError::Provider(..))`.
#[async_trait]
pub trait WalletExtension: Send + Sync {
    async fn is_connected(&self) -> WalletResult<bool>;
    async fn request_access(&self) -> WalletResult<()>;
    async fn get_address(&self) -> WalletResult<String>;
    /// Returns the signed envelope.
    async fn sign_transaction(
        &self,
        envelope_xdr: &str,
        network_passphrase: &str,
    ) -> WalletResult<String>;
}

pub struct DirectWalletAdapter {
    core: AdapterCore,
    extension: Option<Arc<dyn WalletExtension>>,
    record: IdentityRecord,
    method: Mutex<Option<ConnectionMethod>>,
}

impl DirectWalletAdapter {
    pub fn new(
        extension: Option<Arc<dyn WalletExtension>>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        let source = ConnectionSource::DirectWallet;
        Self {
            core: AdapterCore::new(source, clock, policy),
            extension,
            record: IdentityRecord::new(store, source),
            method: Mutex::new(None),
        }
    }

    pub fn has_extension(&self) -> bool {
        self.extension.is_some()
    }

    /// How the current connection was made.
    pub fn method(&self) -> Option<ConnectionMethod> {
        *self.method.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn extension(&self) -> WalletResult<&Arc<dyn WalletExtension>> {
        self.extension
            .as_ref()
            .ok_or_else(|| WalletError::InvalidRequest("no wallet extension installed".into()))
    }

    fn establish(&self, public_key: String, method: ConnectionMethod) {
        if let Err(e) = self.record.save(&public_key, method) {
            tracing::warn!("direct-wallet: could not persist identity: {}", e);
        }
        *self.method.lock().unwrap_or_else(PoisonError::into_inner) = Some(method);
        self.core.mark_connected(public_key);
    }

    /// Connect read-only with a typed-in account id.
    pub async fn connect_manual(&self, address: &str) -> WalletResult<String> {
        self.core.require_ready()?;
        let address = address.trim();
        if !is_account_id(address) {
            return Err(WalletError::InvalidRequest(format!(
                "{:?} is not a valid account id",
                address
            )));
        }
        self.establish(address.to_string(), ConnectionMethod::ManualEntry);
        Ok(address.to_string())
    }

    /// Pick up where the last session left off.
    async fn restore(&self) {
        let persisted = match self.record.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("direct-wallet: unreadable identity record: {}", e);
                return;
            }
        };
        let still_granted = match persisted.method {
            ConnectionMethod::ManualEntry => true,
            _ => match &self.extension {
                Some(ext) => ext.is_connected().await.unwrap_or(false),
                None => false,
            },
        };
        if still_granted {
            tracing::info!("direct-wallet: restored {} session", persisted.method.as_str());
            *self.method.lock().unwrap_or_else(PoisonError::into_inner) = Some(persisted.method);
            self.core.mark_connected(persisted.public_key);
        }
    }
}

#[async_trait]
impl ProviderAdapter for DirectWalletAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn initialize(&self) -> AdapterStatus {
        let extension = self.extension.clone();
        let handshake = || {
            let ext = extension.clone();
            async move {
                match ext {
                    Some(ext) => ext.is_connected().await.map(|_| ()),
                    None => Ok(()),
                }
            }
        };
        match self.core.run_initialize(handshake).await {
            Some(AdapterStatus::Ready) => {
                self.restore().await;
                AdapterStatus::Ready
            }
            Some(status) => status,
            None => self.core.status(),
        }
    }

    async fn connect(&self) -> WalletResult<String> {
        self.core.require_ready()?;
        let ext = self.extension()?;
        ext.request_access().await?;
        let address = ext.get_address().await?;
        if !is_account_id(&address) {
            return Err(WalletError::Provider(format!(
                "extension returned malformed address {:?}",
                address
            )));
        }
        self.establish(address.clone(), ConnectionMethod::WalletExtension);
        Ok(address)
    }

    async fn disconnect(&self) {
        self.record.clear();
        self.method.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.core.mark_logged_out();
    }

    async fn revalidate(&self) {
        if !self.core.is_connected() || self.method() != Some(ConnectionMethod::WalletExtension) {
            return;
        }
        let Some(ext) = &self.extension else { return };
        match ext.is_connected().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("direct-wallet: extension revoked access");
                self.method.lock().unwrap_or_else(PoisonError::into_inner).take();
                self.core.mark_disconnected();
            }
            Err(e) => tracing::debug!("direct-wallet: revalidation skipped: {}", e),
        }
    }

    async fn sign_transaction(
        &self,
        envelope_xdr: &str,
        network_passphrase: &str,
    ) -> WalletResult<String> {
        if self.method() != Some(ConnectionMethod::WalletExtension) || !self.core.is_connected() {
            return Err(WalletError::InvalidRequest("connect a wallet extension to sign".into()));
        }
        self.extension()?.sign_transaction(envelope_xdr, network_passphrase).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ADDRESS: &str = "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX";

    struct Extension {
        granted: AtomicBool,
    }

    #[async_trait]
    impl WalletExtension for Extension {
        async fn is_connected(&self) -> WalletResult<bool> {
            Ok(self.granted.load(Ordering::SeqCst))
        }
        async fn request_access(&self) -> WalletResult<()> {
            self.granted.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn get_address(&self) -> WalletResult<String> {
            Ok(ADDRESS.to_string())
        }
        async fn sign_transaction(&self, xdr: &str, _passphrase: &str) -> WalletResult<String> {
            Ok(format!("signed:{}", xdr))
        }
    }

    fn with_extension(
        granted: bool,
        mem: Arc<MemoryStore>,
    ) -> (DirectWalletAdapter, Arc<Extension>) {
        let ext = Arc::new(Extension { granted: AtomicBool::new(granted) });
        let adapter = DirectWalletAdapter::new(
            Some(ext.clone()),
            mem,
            Arc::new(ManualClock::new()),
            RetryPolicy::default(),
        );
        (adapter, ext)
    }

    fn manual_only(mem: Arc<MemoryStore>) -> DirectWalletAdapter {
        DirectWalletAdapter::new(None, mem, Arc::new(ManualClock::new()), RetryPolicy::default())
    }

    #[tokio::test]
    async fn extension_connect_and_sign() {
        let (adapter, _) = with_extension(false, Arc::new(MemoryStore::new()));
        adapter.initialize().await;
        assert_eq!(adapter.connect().await.unwrap(), ADDRESS);
        assert_eq!(adapter.method(), Some(ConnectionMethod::WalletExtension));
        let signed = adapter.sign_transaction("AAAA", "Test SDF Network ; September 2015").await;
        assert_eq!(signed.unwrap(), "signed:AAAA");
    }

    #[tokio::test]
    async fn manual_entry_validates_and_is_read_only() {
        let adapter = manual_only(Arc::new(MemoryStore::new()));
        adapter.initialize().await;
        assert!(matches!(
            adapter.connect_manual("GNOTAKEY").await,
            Err(WalletError::InvalidRequest(_))
        ));
        assert!(matches!(adapter.connect().await, Err(WalletError::InvalidRequest(_))));
        assert_eq!(adapter.connect_manual(&format!(" {} ", ADDRESS)).await.unwrap(), ADDRESS);
        assert!(adapter.sign_transaction("AAAA", "x").await.is_err());
    }

    #[tokio::test]
    async fn restores_manual_entry() {
        let mem = Arc::new(MemoryStore::new());
        let first = manual_only(mem.clone());
        first.initialize().await;
        first.connect_manual(ADDRESS).await.unwrap();

        let second = manual_only(mem);
        second.initialize().await;
        assert_eq!(second.public_key().as_deref(), Some(ADDRESS));
        assert_eq!(second.method(), Some(ConnectionMethod::ManualEntry));
    }

    #[tokio::test]
    async fn extension_session_restores_only_while_granted() {
        let mem = Arc::new(MemoryStore::new());
        let (first, _) = with_extension(false, mem.clone());
        first.initialize().await;
        first.connect().await.unwrap();

        let (revoked, _) = with_extension(false, mem.clone());
        revoked.initialize().await;
        assert!(!revoked.state().connected);

        let (granted, _) = with_extension(true, mem);
        granted.initialize().await;
        assert!(granted.state().connected);
    }

    #[tokio::test]
    async fn revalidate_drops_revoked_connection() {
        let (adapter, ext) = with_extension(false, Arc::new(MemoryStore::new()));
        adapter.initialize().await;
        adapter.connect().await.unwrap();
        ext.granted.store(false, Ordering::SeqCst);
        adapter.revalidate().await;
        assert!(!adapter.state().connected);
        assert_eq!(adapter.status(), AdapterStatus::Ready);
    }
}
