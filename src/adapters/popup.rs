//! Popup-login identity adapter.
//!
//! The provider hands back a generic private key after its popup login. The
//! ledger key is derived from it one-way ([`Identity::from_secret`]), so the
//! provider secret never becomes the ledger secret.

use super::{AdapterCore, AdapterStatus, ProviderAdapter, RetryPolicy};
use crate::clock::Clock;
use crate::errors::{WalletError, WalletResult};
use crate::identity::Identity;
use crate::session::{ConnectionMethod, ConnectionSource};
use crate::store::{IdentityRecord, KeyValueStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Provider RPC method that returns the raw private key.
pub const PRIVATE_KEY_METHOD: &str = "private_key";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Popup-based identity SDK.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// SDK handshake. Throttling surfaces as `RateLimited`, `Network`, or a
    /// `Provider` message carrying the signal.
    async fn init_modal(&self) -> WalletResult<()>;
    /// Open the login popup.
    async fn connect(&self) -> WalletResult<Arc<dyn ProviderHandle>>;
    async fn user_info(&self) -> WalletResult<UserInfo>;
    async fn logout(&self) -> WalletResult<()>;
    /// Session the SDK kept from an earlier login, if any.
    async fn cached_session(&self) -> WalletResult<Option<Arc<dyn ProviderHandle>>> {
        Ok(None)
    }
}

#[async_trait]
pub trait ProviderHandle: Send + Sync {
    async fn request(&self, method: &str) -> WalletResult<String>;
}

/// Login state shared by both popup adapters.
pub(super) struct PopupLogin {
    provider: Arc<dyn IdentityProvider>,
    identity: Mutex<Option<Identity>>,
    user: Mutex<Option<UserInfo>>,
}

impl PopupLogin {
    pub(super) fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider, identity: Mutex::new(None), user: Mutex::new(None) }
    }

    pub(super) fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Ask the handle for its private key.
    pub(super) async fn secret(
        handle: &dyn ProviderHandle,
    ) -> WalletResult<zeroize::Zeroizing<String>> {
        let secret = handle.request(PRIVATE_KEY_METHOD).await?;
        if secret.trim().is_empty() {
            return Err(WalletError::Derivation("provider returned an empty private key".into()));
        }
        Ok(zeroize::Zeroizing::new(secret))
    }

    /// Adopt a derived identity; user info is best-effort.
    pub(super) async fn adopt(&self, identity: Identity) -> String {
        let public_key = identity.public_key().to_string();
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity);
        match self.provider.user_info().await {
            Ok(info) => *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(info),
            Err(e) => tracing::debug!("user info unavailable: {}", e),
        }
        public_key
    }

    pub(super) fn user(&self) -> Option<UserInfo> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(super) fn sign(&self, payload: &[u8]) -> WalletResult<Vec<u8>> {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|identity| identity.sign(payload).to_vec())
            .ok_or_else(|| WalletError::InvalidRequest("not logged in".into()))
    }

    pub(super) fn sign_envelope(
        &self,
        envelope_xdr: &str,
        passphrase: &str,
    ) -> WalletResult<String> {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .ok_or_else(|| WalletError::InvalidRequest("not logged in".into()))?
            .sign_envelope(envelope_xdr, passphrase)
    }

    /// Provider logout plus local forget. Never fails.
    pub(super) async fn logout(&self, source: ConnectionSource) {
        if let Err(e) = self.provider.logout().await {
            tracing::warn!("{}: provider logout failed: {}", source, e);
        }
        self.identity.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.user.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

pub struct PopupIdentityAdapter {
    core: AdapterCore,
    login: PopupLogin,
    record: IdentityRecord,
}

impl PopupIdentityAdapter {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        let source = ConnectionSource::PopupIdentity;
        Self {
            core: AdapterCore::new(source, clock, policy),
            login: PopupLogin::new(provider),
            record: IdentityRecord::new(store, source),
        }
    }

    pub fn user_info(&self) -> Option<UserInfo> {
        self.login.user()
    }

    async fn finish_login(&self, handle: &dyn ProviderHandle) -> WalletResult<String> {
        let secret = PopupLogin::secret(handle).await?;
        let identity = Identity::from_secret(&secret)?;
        let public_key = self.login.adopt(identity).await;
        if let Err(e) = self.record.save(&public_key, ConnectionMethod::PopupLogin) {
            tracing::warn!("{}: could not persist identity: {}", self.core.source(), e);
        }
        self.core.mark_connected(public_key.clone());
        Ok(public_key)
    }

    async fn resume_cached(&self) {
        match self.login.provider().cached_session().await {
            Ok(Some(handle)) => match self.finish_login(handle.as_ref()).await {
                Ok(pk) => {
                    tracing::info!("{}: resumed cached session for {}", self.core.source(), pk)
                }
                Err(e) => tracing::warn!("{}: cached session unusable: {}", self.core.source(), e),
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("{}: no cached session: {}", self.core.source(), e),
        }
    }
}

#[async_trait]
impl ProviderAdapter for PopupIdentityAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn initialize(&self) -> AdapterStatus {
        let provider = self.login.provider().clone();
        let handshake = || {
            let p = provider.clone();
            async move { p.init_modal().await }
        };
        match self.core.run_initialize(handshake).await {
            Some(AdapterStatus::Ready) => {
                self.resume_cached().await;
                AdapterStatus::Ready
            }
            Some(status) => status,
            None => self.core.status(),
        }
    }

    async fn connect(&self) -> WalletResult<String> {
        self.core.require_ready()?;
        let handle = self.login.provider().connect().await?;
        self.finish_login(handle.as_ref()).await
    }

    async fn disconnect(&self) {
        self.login.logout(self.core.source()).await;
        self.record.clear();
        self.core.mark_logged_out();
    }

    async fn sign_transaction(
        &self,
        envelope_xdr: &str,
        network_passphrase: &str,
    ) -> WalletResult<String> {
        self.login.sign_envelope(envelope_xdr, network_passphrase)
    }

    async fn sign_message(&self, payload: &[u8]) -> WalletResult<Vec<u8>> {
        self.login.sign(payload)
    }
}
