//! Legacy popup adapter: the popup-login SDK wrapped a second time through
//! the older integration path. The provider secret is parked in the durable
//! store while the login popup hands off, and erased as soon as it is consumed.

use super::popup::PopupLogin;
use super::{AdapterCore, AdapterStatus, IdentityProvider, ProviderAdapter, RetryPolicy, UserInfo};
use crate::clock::Clock;
use crate::errors::{WalletError, WalletResult};
use crate::identity::Identity;
use crate::session::{ConnectionMethod, ConnectionSource};
use crate::store::{IdentityRecord, KeyValueStore};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LegacyPopupAdapter {
    core: AdapterCore,
    login: PopupLogin,
    record: IdentityRecord,
}

impl LegacyPopupAdapter {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        let source = ConnectionSource::LegacyPopup;
        Self {
            core: AdapterCore::new(source, clock, policy),
            login: PopupLogin::new(provider),
            record: IdentityRecord::new(store, source),
        }
    }

    pub fn user_info(&self) -> Option<UserInfo> {
        self.login.user()
    }

    /// Consume the parked secret, if any, and connect with the derived key.
    async fn consume_handoff(&self) -> WalletResult<Option<String>> {
        let Some(secret) = self.record.take_secret()? else {
            return Ok(None);
        };
        let identity = Identity::from_secret(&secret)?;
        let public_key = self.login.adopt(identity).await;
        self.record.save(&public_key, ConnectionMethod::LegacyPopupLogin)?;
        self.core.mark_connected(public_key.clone());
        Ok(Some(public_key))
    }
}

#[async_trait]
impl ProviderAdapter for LegacyPopupAdapter {
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
                // A popup that closed mid-handoff leaves its secret behind.
                match self.consume_handoff().await {
                    Ok(Some(pk)) => {
                        tracing::info!("legacy-popup: completed pending handoff for {}", pk)
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("legacy-popup: pending handoff failed: {}", e),
                }
                AdapterStatus::Ready
            }
            Some(status) => status,
            None => self.core.status(),
        }
    }

    async fn connect(&self) -> WalletResult<String> {
        self.core.require_ready()?;
        let handle = self.login.provider().connect().await?;
        let secret = PopupLogin::secret(handle.as_ref()).await?;
        self.record.stash_secret(&secret)?;
        match self.consume_handoff().await {
            Ok(Some(pk)) => Ok(pk),
            Ok(None) => Err(WalletError::Storage("handoff secret vanished".into())),
            Err(e) => {
                self.record.clear();
                Err(e)
            }
        }
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
