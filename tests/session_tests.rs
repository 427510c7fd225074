//! Integration Tests: wallet session end to end
//!
//! These tests verify:
//! 1. Connecting through an adapter populates the session
//! 2. Precedence when two adapters hold different accounts
//! 3. Stale balance responses never land
//! 4. Payment preconditions fail before the widget is touched
//! 5. Retry cap, idempotent initialize and manual retry
//! 6. Logout, persistence and restore across restarts
//! 7. Every adapter kind can sign and submit

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wallet_session::adapters::AdapterStatus;
use wallet_session::payment::BuyRequest;
use wallet_session::session::Amount;
use wallet_session::store::{FileStore, KeyValueStore, MemoryStore};
use wallet_session::{ConnectionSource, Node, NodeConfig, WalletError};

struct Harness {
    node: Node,
    provider: Arc<MockProvider>,
    extension: Arc<MockExtension>,
    ledger: Arc<MockLedger>,
    widget: Arc<MockWidget>,
}

fn harness_with(provider: Arc<MockProvider>, store: Arc<dyn KeyValueStore>) -> Harness {
    let extension = MockExtension::new(ACCOUNT_A);
    let ledger = MockLedger::new("100.0000000");
    let widget = Arc::new(MockWidget::default());
    let node = Node::builder(NodeConfig::new("test-session"))
        .with_identity_provider(provider.clone())
        .with_extension(extension.clone())
        .with_ledger(ledger.clone())
        .with_widget(widget.clone())
        .with_store(store)
        .build()
        .expect("node");
    Harness { node, provider, extension, ledger, widget }
}

fn harness() -> Harness {
    harness_with(MockProvider::new(), Arc::new(MemoryStore::new()))
}

/// Scenario A: ready adapter, connect → session connected with that key
#[tokio::test]
async fn connect_populates_session() {
    let h = harness();
    let statuses = h.node.initialize_all().await;
    assert!(statuses.values().all(|s| *s == AdapterStatus::Ready));

    let pk = h.node.connect(ConnectionSource::PopupIdentity).await.expect("connect");
    assert_eq!(pk, DERIVED_ACCOUNT);

    let session = h.node.session();
    assert!(session.is_connected);
    assert_eq!(session.public_key.as_deref(), Some(DERIVED_ACCOUNT));
    assert_eq!(session.connection_source, ConnectionSource::PopupIdentity);
}

/// Scenario B: two accounts connected → higher precedence wins
#[tokio::test]
async fn higher_precedence_account_wins() {
    let h = harness();
    h.node.initialize_all().await;
    h.node.connect(ConnectionSource::PopupIdentity).await.unwrap();
    h.node.connect(ConnectionSource::DirectWallet).await.unwrap();

    let session = h.node.session();
    assert_eq!(session.public_key.as_deref(), Some(ACCOUNT_A));
    assert_eq!(session.connection_source, ConnectionSource::DirectWallet);

    // direct logs out → popup identity takes over
    h.node.disconnect(ConnectionSource::DirectWallet).await.unwrap();
    let session = h.node.session();
    assert!(session.is_connected);
    assert_eq!(session.public_key.as_deref(), Some(DERIVED_ACCOUNT));
}

#[tokio::test]
async fn custom_precedence_is_honoured() {
    let provider = MockProvider::new();
    let node = Node::builder(NodeConfig::new("test-order").with_precedence(vec![
        ConnectionSource::PopupIdentity,
        ConnectionSource::DirectWallet,
        ConnectionSource::LegacyPopup,
    ]))
    .with_identity_provider(provider)
    .with_extension(MockExtension::new(ACCOUNT_A))
    .with_ledger(MockLedger::new("1"))
    .with_store(Arc::new(MemoryStore::new()))
    .build()
    .unwrap();
    node.initialize_all().await;
    node.connect(ConnectionSource::DirectWallet).await.unwrap();
    node.connect(ConnectionSource::PopupIdentity).await.unwrap();
    assert_eq!(node.session().connection_source, ConnectionSource::PopupIdentity);
}

/// Scenario C: response for a query started before disconnect is discarded
#[tokio::test(start_paused = true)]
async fn stale_balance_is_discarded() {
    let h = harness();
    h.node.start();
    h.node.initialize(ConnectionSource::DirectWallet).await.unwrap();

    // t=0: connect, first poll answers at once with 100
    h.node.connect(ConnectionSource::DirectWallet).await.unwrap();
    settle().await;
    assert_eq!(h.node.session().balance.as_ref().unwrap().native, Amount::from_units(100));

    // t=0: a refresh whose answer (999) only arrives at t=10s
    h.ledger.queue(Duration::from_secs(10), Ok("999.0000000"));
    let node = Arc::new(h.node);
    let refresh = {
        let node = node.clone();
        tokio::spawn(async move { node.refresh_balance().await })
    };
    settle().await;

    // t=5s: the extension revokes access
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.extension.revoke();
    node.revalidate().await;
    assert!(!node.session().is_connected);

    // t=10s: late answer arrives and is dropped
    refresh.await.unwrap().unwrap();
    let session = node.session();
    assert_eq!(session.balance.unwrap().native, Amount::from_units(100));
    assert_eq!(h.ledger.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn polls_every_interval_while_connected() {
    let h = harness();
    h.node.start();
    h.node.initialize_all().await;
    h.node.connect_manual(ACCOUNT_B).await.unwrap();
    settle().await;
    assert_eq!(h.ledger.calls(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(h.ledger.calls(), 3);

    h.node.logout().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(h.ledger.calls(), 3);
    assert_eq!(h.node.session(), wallet_session::Session::default());
    h.node.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn logout_of_background_adapter_refetches_balance() {
    let h = harness();
    h.node.start();
    h.node.initialize_all().await;
    h.node.connect(ConnectionSource::DirectWallet).await.unwrap();
    h.node.connect(ConnectionSource::PopupIdentity).await.unwrap();
    settle().await;
    assert_eq!(h.node.session().public_key.as_deref(), Some(ACCOUNT_A));
    assert_eq!(h.ledger.calls(), 1);

    // popup identity was not supplying the session; its logout still clears the balance
    h.node.disconnect(ConnectionSource::PopupIdentity).await.unwrap();
    settle().await;
    let session = h.node.session();
    assert!(session.is_connected);
    assert_eq!(session.public_key.as_deref(), Some(ACCOUNT_A));
    assert_eq!(session.balance.unwrap().native, Amount::from_units(100));
    assert_eq!(h.ledger.calls(), 2);

    tokio::time::sleep(Duration::from_secs(20)).await;
    settle().await;
    assert!(h.node.session().balance.is_some());
    h.node.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refresh_without_wallet_is_rejected_locally() {
    let h = harness();
    h.node.start();
    let err = h.node.refresh_balance().await.unwrap_err();
    assert_eq!(err, WalletError::InvalidRequest("connect your wallet first".into()));
    assert_eq!(h.ledger.calls(), 0);
}

/// Scenario D: negative amount → InvalidRequest, widget untouched
#[tokio::test]
async fn invalid_purchase_never_reaches_widget() {
    let h = harness();
    h.node.initialize_all().await;
    h.node.connect(ConnectionSource::DirectWallet).await.unwrap();

    let err = h.node.buy(&BuyRequest { amount: -5.0, ..Default::default() }).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidRequest(_)));
    assert!(h.widget.opened.lock().unwrap().is_empty());

    let launched = h.node.buy(&BuyRequest { amount: 40.0, ..Default::default() }).await.unwrap();
    assert_eq!(launched.id, "widget-1");
    let opened = h.widget.opened.lock().unwrap();
    assert_eq!(opened[0].destination_address, ACCOUNT_A);
    assert_eq!(opened[0].fiat_currency, "USD");
}

#[tokio::test(start_paused = true)]
async fn rate_limits_retry_three_times_then_error() {
    let h = harness_with(MockProvider::rate_limited(usize::MAX), Arc::new(MemoryStore::new()));
    let started = tokio::time::Instant::now();
    let status = h.node.initialize(ConnectionSource::PopupIdentity).await.unwrap();
    assert_eq!(status, AdapterStatus::Error);
    assert_eq!(h.provider.inits(), 4);
    assert!(started.elapsed() >= Duration::from_millis(2000 + 4000 + 8000));

    let state = h.node.adapter(ConnectionSource::PopupIdentity).unwrap().state();
    assert_eq!(state.retry_count, 3);
    assert!(state.last_error.unwrap().contains("429"));

    let err = h.node.connect(ConnectionSource::PopupIdentity).await.unwrap_err();
    assert!(matches!(err, WalletError::NotReady { rate_limited: false, .. }));

    // manual retry once the provider recovers
    h.provider.recover();
    let status = h.node.initialize(ConnectionSource::PopupIdentity).await.unwrap();
    assert_eq!(status, AdapterStatus::Ready);
    assert_eq!(h.node.adapter(ConnectionSource::PopupIdentity).unwrap().state().retry_count, 0);
}

#[tokio::test]
async fn initialize_on_ready_adapter_is_a_no_op() {
    let h = harness();
    h.node.initialize(ConnectionSource::PopupIdentity).await.unwrap();
    let before = h.node.adapter(ConnectionSource::PopupIdentity).unwrap().snapshot().seq;
    let inits = h.provider.inits();

    let status = h.node.initialize(ConnectionSource::PopupIdentity).await.unwrap();
    assert_eq!(status, AdapterStatus::Ready);
    assert_eq!(h.provider.inits(), inits);
    assert_eq!(h.node.adapter(ConnectionSource::PopupIdentity).unwrap().snapshot().seq, before);
}

#[tokio::test]
async fn sign_and_submit_goes_through_session_adapter() {
    let h = harness();
    h.node.initialize_all().await;
    assert!(h.node.sign_and_submit("AAAA").await.is_err());

    h.node.connect(ConnectionSource::DirectWallet).await.unwrap();
    let hash = h.node.sign_and_submit("AAAA").await.unwrap();
    assert_eq!(hash, "c0ffee");
    assert_eq!(*h.ledger.submitted.lock().unwrap(), vec!["AAAA:signed".to_string()]);

    h.ledger.reject(&["tx_failed", "op_underfunded"]);
    let err = h.node.sign_and_submit("BBBB").await.unwrap_err();
    assert_eq!(
        err,
        WalletError::SubmissionRejected(vec!["tx_failed".into(), "op_underfunded".into()])
    );
}

#[tokio::test]
async fn popup_session_signs_and_submits_with_derived_key() {
    use stellar_xdr::curr::{Limits, ReadXdr, TransactionEnvelope};

    let h = harness();
    h.node.initialize_all().await;
    h.node.connect(ConnectionSource::PopupIdentity).await.unwrap();
    assert_eq!(h.node.session().connection_source, ConnectionSource::PopupIdentity);

    let unsigned = unsigned_envelope(DERIVED_ACCOUNT);
    assert_eq!(h.node.sign_and_submit(&unsigned).await.unwrap(), "c0ffee");

    let submitted = h.ledger.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    let envelope = TransactionEnvelope::from_xdr_base64(&submitted[0], Limits::none()).unwrap();
    let TransactionEnvelope::Tx(env) = envelope else { panic!("expected v1 envelope") };
    let raw = wallet_session::identity::decode_account_id(DERIVED_ACCOUNT).unwrap();
    assert_eq!(env.signatures.len(), 1);
    assert_eq!(env.signatures[0].hint.0, raw[28..]);
}

#[tokio::test]
async fn legacy_popup_session_signs_transactions() {
    let h = harness();
    h.node.initialize_all().await;
    h.node.connect(ConnectionSource::LegacyPopup).await.unwrap();
    assert_eq!(h.node.session().connection_source, ConnectionSource::LegacyPopup);
    let hash = h.node.sign_and_submit(&unsigned_envelope(DERIVED_ACCOUNT)).await.unwrap();
    assert_eq!(hash, "c0ffee");
    assert_eq!(h.ledger.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn logout_clears_session_and_records() {
    let store = Arc::new(MemoryStore::new());
    let h = harness_with(MockProvider::new(), store.clone());
    h.node.initialize_all().await;
    h.node.connect(ConnectionSource::LegacyPopup).await.unwrap();
    h.node.connect_manual(ACCOUNT_B).await.unwrap();
    assert_eq!(h.node.session().connection_source, ConnectionSource::LegacyPopup);

    h.node.logout().await;
    assert_eq!(h.node.session(), wallet_session::Session::default());
    assert!(store.keys().is_empty());
    assert!(h.provider.logout_calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn persisted_identity_survives_restart() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("identity.json");

    {
        let store = Arc::new(FileStore::open_at(&path).unwrap());
        let h = harness_with(MockProvider::new(), store);
        h.node.initialize_all().await;
        h.node.connect_manual(ACCOUNT_B).await.unwrap();
    }

    let store = Arc::new(FileStore::open_at(&path).unwrap());
    let h = harness_with(MockProvider::new(), store);
    let session = h.node.session();
    assert_eq!(session.public_key.as_deref(), Some(ACCOUNT_B));
    assert!(!session.is_connected);

    h.node.initialize_all().await;
    let session = h.node.session();
    assert!(session.is_connected);
    assert_eq!(session.connection_source, ConnectionSource::DirectWallet);
}
