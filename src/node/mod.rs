//! Node - bootstrap facade wiring adapters, reconciler, poller and payments.
//!
//! ```text
//! NodeBuilder::build
//!   ├── store (file-backed natively)
//!   ├── adapters per config.adapters ──attach──▶ Reconciler ──▶ SessionStore
//!   │                                              ▲ restored identity
//!   ├── BalancePoller(ledger, SessionStore)
//!   └── PaymentBridge(widget, SessionStore)
//!
//! Node::start → spawn poller + one initialize task per adapter
//! ```
//!
//! The host supplies the SDK bindings (identity provider, wallet extension);
//! everything else has a native default.

mod config;

pub use config::{NodeConfig, PinningConfig};

use crate::adapters::{
    AdapterStatus, DirectWalletAdapter, IdentityProvider, LegacyPopupAdapter, PopupIdentityAdapter,
    ProviderAdapter, WalletExtension,
};
use crate::clock::{Clock, TokioClock};
use crate::errors::{WalletError, WalletResult};
use crate::ledger::LedgerClient;
use crate::payment::{
    BuyRequest, CompletionListener, HostedWidget, PaymentBridge, PaymentCompletion, PaymentWidget,
    WidgetSession,
};
use crate::pinning::PinningService;
use crate::poller::{BalancePoller, PollerHandle};
use crate::reconciler::Reconciler;
use crate::runtime::Shutdown;
use crate::session::{ConnectionSource, Session, SessionStore};
use crate::store::{restore_identity, KeyValueStore, MemoryStore};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Collects the collaborators a [`Node`] needs.
pub struct NodeBuilder {
    config: NodeConfig,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    extension: Option<Arc<dyn WalletExtension>>,
    ledger: Option<Arc<dyn LedgerClient>>,
    widget: Option<Arc<dyn PaymentWidget>>,
    pinning: Option<Arc<dyn PinningService>>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl NodeBuilder {
    pub fn with_identity_provider(mut self, p: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(p); self
    }
    pub fn with_extension(mut self, e: Arc<dyn WalletExtension>) -> Self {
        self.extension = Some(e); self
    }
    pub fn with_ledger(mut self, l: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(l); self
    }
    pub fn with_widget(mut self, w: Arc<dyn PaymentWidget>) -> Self {
        self.widget = Some(w); self
    }
    pub fn with_pinning(mut self, p: Arc<dyn PinningService>) -> Self {
        self.pinning = Some(p); self
    }
    pub fn with_store(mut self, s: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(s); self
    }
    pub fn with_clock(mut self, c: Arc<dyn Clock>) -> Self {
        self.clock = Some(c); self
    }

    #[cfg(feature = "native")]
    fn default_ledger(config: &NodeConfig) -> WalletResult<Arc<dyn LedgerClient>> {
        let client = match &config.horizon_url {
            Some(url) => crate::ledger::HorizonClient::with_url(config.network, url),
            None => crate::ledger::HorizonClient::new(config.network),
        };
        Ok(Arc::new(client))
    }

    #[cfg(not(feature = "native"))]
    fn default_ledger(_config: &NodeConfig) -> WalletResult<Arc<dyn LedgerClient>> {
        Err(WalletError::InvalidRequest("no ledger client configured".into()))
    }

    #[cfg(feature = "native")]
    fn default_store(config: &NodeConfig) -> WalletResult<Arc<dyn KeyValueStore>> {
        let store = match &config.data_dir {
            Some(dir) => crate::store::FileStore::open_at(dir.join("identity.json"))?,
            None => crate::store::FileStore::open(&config.app)?,
        };
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "native"))]
    fn default_store(_config: &NodeConfig) -> WalletResult<Arc<dyn KeyValueStore>> {
        Ok(Arc::new(MemoryStore::new()))
    }

    #[cfg(feature = "native")]
    fn default_pinning(config: &NodeConfig) -> WalletResult<Option<Arc<dyn PinningService>>> {
        let Some(p) = &config.pinning else { return Ok(None) };
        let client = crate::pinning::PinataClient::new(crate::pinning::PinataConfig {
            api_url: p.api_url.clone().unwrap_or_default(),
            jwt: p.jwt.clone(),
            gateway: p.gateway.clone().unwrap_or_default(),
        })?;
        Ok(Some(Arc::new(client)))
    }

    #[cfg(not(feature = "native"))]
    fn default_pinning(_config: &NodeConfig) -> WalletResult<Option<Arc<dyn PinningService>>> {
        Ok(None)
    }

    pub fn build(self) -> WalletResult<Node> {
        let config = self.config;
        config.validate()?;
        let store = match self.store {
            Some(store) => store,
            None => Self::default_store(&config)?,
        };
        let ledger = match self.ledger {
            Some(ledger) => ledger,
            None => Self::default_ledger(&config)?,
        };
        let widget: Option<Arc<dyn PaymentWidget>> = match (self.widget, &config.widget) {
            (Some(widget), _) => Some(widget),
            (None, Some(hosted)) => Some(Arc::new(HostedWidget::new(hosted.clone())?)),
            (None, None) => None,
        };
        let pinning = match self.pinning {
            Some(p) => Some(p),
            None => Self::default_pinning(&config)?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock::new()));

        let mut adapters: BTreeMap<ConnectionSource, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        let mut direct = None;
        for source in &config.adapters {
            match source {
                ConnectionSource::DirectWallet => {
                    let adapter = Arc::new(DirectWalletAdapter::new(
                        self.extension.clone(),
                        store.clone(),
                        clock.clone(),
                        config.retry,
                    ));
                    direct = Some(adapter.clone());
                    adapters.insert(*source, adapter);
                }
                ConnectionSource::PopupIdentity | ConnectionSource::LegacyPopup => {
                    let Some(provider) = self.identity_provider.clone() else {
                        tracing::warn!("{} enabled without an identity provider; skipped", source);
                        continue;
                    };
                    let adapter: Arc<dyn ProviderAdapter> =
                        if *source == ConnectionSource::PopupIdentity {
                            Arc::new(PopupIdentityAdapter::new(
                                provider,
                                store.clone(),
                                clock.clone(),
                                config.retry,
                            ))
                        } else {
                            Arc::new(LegacyPopupAdapter::new(
                                provider,
                                store.clone(),
                                clock.clone(),
                                config.retry,
                            ))
                        };
                    adapters.insert(*source, adapter);
                }
                ConnectionSource::None => {}
            }
        }

        let session = Arc::new(SessionStore::new());
        let enabled: Vec<ConnectionSource> =
            config.precedence.iter().copied().filter(|s| adapters.contains_key(s)).collect();
        let reconciler = Arc::new(
            Reconciler::new(session.clone())
                .with_precedence(config.precedence.clone())?
                .with_restored(restore_identity(&store, &enabled)),
        );
        for adapter in adapters.values() {
            reconciler.attach(adapter.as_ref());
        }

        let poller =
            BalancePoller::new(ledger.clone(), session.clone()).with_interval(config.poll_interval);
        let payments = widget.map(|w| PaymentBridge::new(w, session.clone()));
        tracing::info!(
            "node {} ready: adapters {:?}, network {}",
            config.app,
            adapters.keys().map(ConnectionSource::as_str).collect::<Vec<_>>(),
            ledger.network().as_str()
        );

        Ok(Node {
            config,
            session,
            reconciler,
            adapters,
            direct,
            ledger,
            poller,
            poller_handle: Mutex::new(None),
            payments,
            pinning,
            shutdown: Shutdown::new(),
        })
    }
}

/// One logical wallet session over every configured provider.
pub struct Node {
    config: NodeConfig,
    session: Arc<SessionStore>,
    reconciler: Arc<Reconciler>,
    adapters: BTreeMap<ConnectionSource, Arc<dyn ProviderAdapter>>,
    direct: Option<Arc<DirectWalletAdapter>>,
    ledger: Arc<dyn LedgerClient>,
    poller: BalancePoller,
    poller_handle: Mutex<Option<PollerHandle>>,
    payments: Option<PaymentBridge>,
    pinning: Option<Arc<dyn PinningService>>,
    shutdown: Shutdown,
}

impl Node {
    pub fn builder(config: NodeConfig) -> NodeBuilder {
        NodeBuilder {
            config,
            identity_provider: None,
            extension: None,
            ledger: None,
            widget: None,
            pinning: None,
            store: None,
            clock: None,
        }
    }

    /// Native defaults for everything the host does not supply.
    pub fn from_config(config: NodeConfig) -> WalletResult<Self> {
        Self::builder(config).build()
    }

    /// In-memory node for hosts without durable storage.
    pub fn ephemeral(config: NodeConfig, ledger: Arc<dyn LedgerClient>) -> WalletResult<Self> {
        Self::builder(config).with_store(Arc::new(MemoryStore::new())).with_ledger(ledger).build()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
    pub fn session(&self) -> Session {
        self.session.snapshot()
    }
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }
    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }
    pub fn pinning(&self) -> Option<&Arc<dyn PinningService>> {
        self.pinning.as_ref()
    }
    pub fn sources(&self) -> Vec<ConnectionSource> {
        self.adapters.keys().copied().collect()
    }

    pub fn adapter(&self, source: ConnectionSource) -> WalletResult<&Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&source)
            .ok_or_else(|| {
                WalletError::InvalidRequest(format!("{} adapter is not enabled", source))
            })
    }

    pub fn adapter_status(&self, source: ConnectionSource) -> Option<AdapterStatus> {
        self.reconciler.adapter_state(source).map(|s| s.status)
    }

    /// Start the balance poller and initialize every adapter in the background.
    pub fn start(&self) {
        {
            let mut handle = self.poller_handle.lock().unwrap_or_else(PoisonError::into_inner);
            if handle.is_none() {
                *handle = Some(self.poller.clone().spawn(self.shutdown.clone()));
            }
        }
        for adapter in self.adapters.values() {
            let adapter = adapter.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    status = adapter.initialize() => {
                        tracing::debug!("{} initialized: {}", adapter.source(), status.as_str());
                    }
                    _ = shutdown.wait() => {}
                }
            });
        }
    }

    /// Initialize (or, from `error`, retry) one adapter and wait for the outcome.
    pub async fn initialize(&self, source: ConnectionSource) -> WalletResult<AdapterStatus> {
        Ok(self.adapter(source)?.initialize().await)
    }

    /// Initialize every adapter concurrently and wait for all of them.
    pub async fn initialize_all(&self) -> BTreeMap<ConnectionSource, AdapterStatus> {
        let tasks: Vec<_> = self
            .adapters
            .iter()
            .map(|(source, adapter)| {
                let adapter = adapter.clone();
                (*source, tokio::spawn(async move { adapter.initialize().await }))
            })
            .collect();
        let mut statuses = BTreeMap::new();
        for (source, task) in tasks {
            let status = task.await.unwrap_or_else(|e| {
                tracing::error!("{} initialization task failed: {}", source, e);
                AdapterStatus::Error
            });
            statuses.insert(source, status);
        }
        statuses
    }

    pub async fn connect(&self, source: ConnectionSource) -> WalletResult<String> {
        self.adapter(source)?.connect().await
    }

    pub async fn connect_manual(&self, address: &str) -> WalletResult<String> {
        match &self.direct {
            Some(direct) => direct.connect_manual(address).await,
            None => Err(WalletError::InvalidRequest("direct-wallet adapter is not enabled".into())),
        }
    }

    /// Log out of one adapter.
    pub async fn disconnect(&self, source: ConnectionSource) -> WalletResult<()> {
        self.adapter(source)?.disconnect().await;
        Ok(())
    }

    /// Log out everywhere.
    pub async fn logout(&self) {
        for adapter in self.adapters.values() {
            adapter.disconnect().await;
        }
    }

    /// Re-check live connections (e.g. when the host window regains focus).
    pub async fn revalidate(&self) {
        for adapter in self.adapters.values() {
            adapter.revalidate().await;
        }
    }

    pub async fn refresh_balance(&self) -> WalletResult<()> {
        let refresher = self
            .poller_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(PollerHandle::refresher);
        match refresher {
            Some(refresher) => refresher.refresh().await,
            None => {
                let session = self.session.snapshot();
                match (session.is_connected, session.public_key) {
                    (true, Some(pk)) => self.poller.query(&pk).await,
                    _ => Err(WalletError::InvalidRequest("connect your wallet first".into())),
                }
            }
        }
    }

    fn payments(&self) -> WalletResult<&PaymentBridge> {
        self.payments
            .as_ref()
            .ok_or_else(|| WalletError::InvalidRequest("payment widget not configured".into()))
    }

    pub async fn buy(&self, request: &BuyRequest) -> WalletResult<WidgetSession> {
        self.payments()?.buy(request).await
    }

    pub fn on_payment_completed(&self, listener: CompletionListener) -> WalletResult<()> {
        self.payments()?.on_payment_completed(listener);
        Ok(())
    }

    pub fn complete_payment(&self, completion: &PaymentCompletion) -> WalletResult<()> {
        self.payments()?.complete(completion);
        Ok(())
    }

    /// The adapter behind the current session.
    fn active_adapter(&self) -> WalletResult<&Arc<dyn ProviderAdapter>> {
        let session = self.session.snapshot();
        if !session.is_connected {
            return Err(WalletError::InvalidRequest("connect your wallet first".into()));
        }
        self.adapter(session.connection_source)
    }

    /// Sign with the session's adapter and submit; returns the transaction hash.
    pub async fn sign_and_submit(&self, envelope_xdr: &str) -> WalletResult<String> {
        let adapter = self.active_adapter()?;
        let signed = adapter
            .sign_transaction(envelope_xdr, self.ledger.network().passphrase())
            .await?;
        self.ledger.submit_transaction(&signed).await
    }

    pub async fn sign_message(&self, payload: &[u8]) -> WalletResult<Vec<u8>> {
        self.active_adapter()?.sign_message(payload).await
    }

    /// Stop the poller and background initialization.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let handle = self.poller_handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.join().await;
        }
    }
}
