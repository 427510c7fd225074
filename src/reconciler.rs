//! Unifying reconciler: N adapter states in, one session identity out.
//!
//! ```text
//! adapter event ──▶ on_event (drop seq ≤ last seen) ──▶ reconcile() ──▶ SessionStore::set_identity
//! ```
//!
//! `reconcile` is pure and runs synchronously inside the notification, under
//! the reconciler's lock, so two recomputations never interleave.

use crate::adapters::{AdapterEvent, AdapterEventKind, AdapterState, ProviderAdapter};
use crate::errors::{WalletError, WalletResult};
use crate::session::{ConnectionSource, SessionIdentity, SessionStore};
use crate::store::PersistedIdentity;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Highest precedence first.
pub const DEFAULT_PRECEDENCE: [ConnectionSource; 3] = [
    ConnectionSource::LegacyPopup,
    ConnectionSource::DirectWallet,
    ConnectionSource::PopupIdentity,
];

/// Identity known from persistence or an earlier connection, shown
/// (disconnected) until a logout clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownIdentity {
    pub source: ConnectionSource,
    pub public_key: String,
}

impl From<&PersistedIdentity> for KnownIdentity {
    fn from(p: &PersistedIdentity) -> Self {
        Self { source: p.method.source(), public_key: p.public_key.clone() }
    }
}

struct Inner {
    adapters: BTreeMap<ConnectionSource, (u64, AdapterState)>,
    known: Option<KnownIdentity>,
}

pub struct Reconciler {
    store: Arc<SessionStore>,
    precedence: Vec<ConnectionSource>,
    inner: Mutex<Inner>,
}

impl Reconciler {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self {
            store,
            precedence: DEFAULT_PRECEDENCE.to_vec(),
            inner: Mutex::new(Inner { adapters: BTreeMap::new(), known: None }),
        }
    }

    /// Custom order. Must name each adapter exactly once.
    pub fn with_precedence(mut self, order: Vec<ConnectionSource>) -> WalletResult<Self> {
        validate_precedence(&order)?;
        self.precedence = order;
        Ok(self)
    }

    /// Seed the session with a persisted identity.
    pub fn with_restored(self, restored: Option<PersistedIdentity>) -> Self {
        if let Some(p) = restored.as_ref() {
            tracing::info!("restored {} session for {}", p.method.as_str(), p.public_key);
            self.lock().known = Some(KnownIdentity::from(p));
            self.recompute(&self.lock());
        }
        self
    }

    pub fn precedence(&self) -> &[ConnectionSource] {
        &self.precedence
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to an adapter and fold in its current state.
    pub fn attach(self: &Arc<Self>, adapter: &dyn ProviderAdapter) {
        let this = Arc::clone(self);
        adapter.subscribe(Arc::new(move |event: &AdapterEvent| this.on_event(event)));
        self.on_event(&adapter.snapshot());
    }

    pub fn on_event(&self, event: &AdapterEvent) {
        let mut inner = self.lock();
        if let Some((seen, _)) = inner.adapters.get(&event.source) {
            if event.seq <= *seen {
                tracing::debug!(
                    "{}: dropping stale event {} (seen {})",
                    event.source,
                    event.seq,
                    seen
                );
                return;
            }
        }
        inner.adapters.insert(event.source, (event.seq, event.state.clone()));
        if event.kind == AdapterEventKind::LoggedOut {
            inner.known = None;
            self.store.reset();
        } else if let (true, Some(pk)) = (event.state.connected, event.state.public_key.as_ref()) {
            inner.known = Some(KnownIdentity { source: event.source, public_key: pk.clone() });
        }
        self.recompute(&inner);
    }

    fn recompute(&self, inner: &Inner) {
        let states: BTreeMap<ConnectionSource, AdapterState> =
            inner.adapters.iter().map(|(source, (_, state))| (*source, state.clone())).collect();
        let identity = reconcile(&states, &self.precedence, inner.known.as_ref());
        if self.store.set_identity(identity.clone()) {
            tracing::debug!(
                "session: {} via {} (connected: {})",
                identity.public_key.as_deref().unwrap_or("-"),
                identity.connection_source,
                identity.is_connected
            );
        }
    }

    /// Current state of one adapter as last seen.
    pub fn adapter_state(&self, source: ConnectionSource) -> Option<AdapterState> {
        self.lock().adapters.get(&source).map(|(_, state)| state.clone())
    }
}

pub fn validate_precedence(order: &[ConnectionSource]) -> WalletResult<()> {
    let complete = order.len() == ConnectionSource::ADAPTERS.len()
        && ConnectionSource::ADAPTERS.iter().all(|s| order.iter().filter(|o| *o == s).count() == 1);
    if complete {
        Ok(())
    } else {
        Err(WalletError::InvalidRequest(format!(
            "precedence must list popup-identity, direct-wallet and legacy-popup once each, got {:?}",
            order.iter().map(ConnectionSource::as_str).collect::<Vec<_>>()
        )))
    }
}

/// Combine adapter states by precedence.
///
/// The highest-precedence connected adapter supplies key and source; with no
/// connected adapter the known identity (if any) is shown disconnected.
pub fn reconcile(
    states: &BTreeMap<ConnectionSource, AdapterState>,
    precedence: &[ConnectionSource],
    known: Option<&KnownIdentity>,
) -> SessionIdentity {
    let connected: Vec<(ConnectionSource, &str)> = precedence
        .iter()
        .filter_map(|source| {
            let state = states.get(source)?;
            match (state.connected, state.public_key.as_deref()) {
                (true, Some(pk)) => Some((*source, pk)),
                _ => None,
            }
        })
        .collect();

    if let Some((winner, key)) = connected.first() {
        for (other, other_key) in &connected[1..] {
            if other_key != key {
                tracing::warn!(
                    "{} and {} report different accounts ({} vs {}); using {}",
                    winner, other, key, other_key, winner
                );
            }
        }
        return SessionIdentity {
            public_key: Some(key.to_string()),
            is_connected: true,
            connection_source: *winner,
        };
    }

    match known {
        Some(k) => SessionIdentity {
            public_key: Some(k.public_key.clone()),
            is_connected: false,
            connection_source: k.source,
        },
        None => SessionIdentity::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterStatus;
    use crate::session::ConnectionMethod;

    fn state(pk: Option<&str>, connected: bool) -> AdapterState {
        AdapterState {
            status: AdapterStatus::Ready,
            public_key: pk.map(str::to_string),
            connected,
            ..Default::default()
        }
    }

    fn event(
        source: ConnectionSource,
        seq: u64,
        kind: AdapterEventKind,
        state: AdapterState,
    ) -> AdapterEvent {
        AdapterEvent { source, seq, kind, state }
    }

    #[test]
    fn precedence_picks_highest_connected() {
        let sources = DEFAULT_PRECEDENCE;
        // every subset of connected adapters
        for mask in 0u8..8 {
            let mut states = BTreeMap::new();
            for (i, source) in sources.iter().enumerate() {
                let on = mask & (1 << i) != 0;
                states.insert(*source, state(Some(source.as_str()), on));
            }
            let identity = reconcile(&states, &sources, None);
            let expected =
                sources.iter().enumerate().find(|(i, _)| mask & (1 << i) != 0).map(|(_, s)| *s);
            assert_eq!(identity.is_connected, expected.is_some());
            assert_eq!(identity.connection_source, expected.unwrap_or_default());
        }
    }

    #[test]
    fn conflicting_keys_resolve_by_precedence() {
        let mut states = BTreeMap::new();
        states.insert(ConnectionSource::DirectWallet, state(Some("GAAA"), true));
        states.insert(ConnectionSource::PopupIdentity, state(Some("GBBB"), true));
        let identity = reconcile(&states, &DEFAULT_PRECEDENCE, None);
        assert_eq!(identity.public_key.as_deref(), Some("GAAA"));
        assert_eq!(identity.connection_source, ConnectionSource::DirectWallet);
    }

    #[test]
    fn known_identity_shows_disconnected() {
        let known =
            KnownIdentity { source: ConnectionSource::PopupIdentity, public_key: "GOLD".into() };
        let identity = reconcile(&BTreeMap::new(), &DEFAULT_PRECEDENCE, Some(&known));
        assert_eq!(identity.public_key.as_deref(), Some("GOLD"));
        assert!(!identity.is_connected);
    }

    #[test]
    fn rejects_incomplete_precedence() {
        assert!(validate_precedence(&[
            ConnectionSource::DirectWallet,
            ConnectionSource::DirectWallet,
            ConnectionSource::LegacyPopup
        ])
        .is_err());
        assert!(validate_precedence(&[ConnectionSource::DirectWallet]).is_err());
        assert!(validate_precedence(&[
            ConnectionSource::PopupIdentity,
            ConnectionSource::LegacyPopup,
            ConnectionSource::DirectWallet
        ])
        .is_ok());
    }

    #[test]
    fn stale_events_are_ignored() {
        let store = Arc::new(SessionStore::new());
        let reconciler = Reconciler::new(store.clone());
        let src = ConnectionSource::DirectWallet;
        reconciler.on_event(&event(src, 2, AdapterEventKind::Connected, state(Some("GNEW"), true)));
        reconciler.on_event(&event(src, 1, AdapterEventKind::Connected, state(Some("GOLD"), true)));
        assert_eq!(store.snapshot().public_key.as_deref(), Some("GNEW"));
    }

    #[test]
    fn logout_clears_known_identity_and_balance() {
        let store = Arc::new(SessionStore::new());
        let restored =
            PersistedIdentity { public_key: "GREST".into(), method: ConnectionMethod::ManualEntry };
        let reconciler = Reconciler::new(store.clone()).with_restored(Some(restored));
        assert_eq!(store.snapshot().public_key.as_deref(), Some("GREST"));
        assert!(!store.snapshot().is_connected);

        let src = ConnectionSource::DirectWallet;
        let connected = event(src, 1, AdapterEventKind::Connected, state(Some("GREST"), true));
        reconciler.on_event(&connected);
        store.apply_balance("GREST", crate::session::Balance::empty());
        assert!(store.snapshot().balance.is_some());

        reconciler.on_event(&event(src, 2, AdapterEventKind::LoggedOut, AdapterState::default()));
        assert_eq!(store.snapshot(), crate::session::Session::default());
    }

    #[test]
    fn dropped_connection_keeps_key_and_balance() {
        let store = Arc::new(SessionStore::new());
        let reconciler = Reconciler::new(store.clone());
        let src = ConnectionSource::DirectWallet;
        let connected = event(src, 1, AdapterEventKind::Connected, state(Some("GKEEP"), true));
        reconciler.on_event(&connected);
        store.apply_balance("GKEEP", crate::session::Balance::empty());
        reconciler.on_event(&event(src, 2, AdapterEventKind::Disconnected, state(None, false)));
        let session = store.snapshot();
        assert_eq!(session.public_key.as_deref(), Some("GKEEP"));
        assert!(!session.is_connected);
        assert!(session.balance.is_some());
    }
}
