//! Test doubles for the external collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wallet_session::adapters::{IdentityProvider, ProviderHandle, UserInfo, WalletExtension};
use wallet_session::ledger::{AccountRecord, BalanceEntry, LedgerClient};
use wallet_session::payment::{PaymentWidget, WidgetParams, WidgetSession};
use wallet_session::{WalletError, WalletResult};

/// Valid account ids (checksummed).
pub const ACCOUNT_A: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";
pub const ACCOUNT_B: &str = "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX";

/// Provider secret and the account id derived from it.
pub const PROVIDER_SECRET: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const DERIVED_ACCOUNT: &str = "GCR7LSRYCUFNAOBYB2PVSE2KBQRPON6IHNNTQ75J25QPEYRQLYLO4UM7";

pub struct MockHandle {
    secret: String,
}

#[async_trait]
impl ProviderHandle for MockHandle {
    async fn request(&self, _method: &str) -> WalletResult<String> {
        Ok(self.secret.clone())
    }
}

/// Popup identity SDK. Fails `init_modal` with a 429 `rate_limited` times.
pub struct MockProvider {
    pub init_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    rate_limited: AtomicUsize,
    secret: String,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Self::rate_limited(0)
    }

    pub fn rate_limited(times: usize) -> Arc<Self> {
        Arc::new(Self {
            init_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            rate_limited: AtomicUsize::new(times),
            secret: PROVIDER_SECRET.to_string(),
        })
    }

    pub fn recover(&self) {
        self.rate_limited.store(0, Ordering::SeqCst);
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn init_modal(&self) -> WalletResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.rate_limited.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.rate_limited.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(WalletError::Provider("HTTP 429: Too Many Requests".into()));
        }
        Ok(())
    }

    async fn connect(&self) -> WalletResult<Arc<dyn ProviderHandle>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockHandle { secret: self.secret.clone() }))
    }

    async fn user_info(&self) -> WalletResult<UserInfo> {
        Ok(UserInfo { email: Some("collector@example.com".into()), name: Some("Collector".into()) })
    }

    async fn logout(&self) -> WalletResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Browser wallet extension holding `address`.
pub struct MockExtension {
    pub granted: AtomicBool,
    pub address: String,
}

impl MockExtension {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self { granted: AtomicBool::new(false), address: address.to_string() })
    }

    pub fn revoke(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletExtension for MockExtension {
    async fn is_connected(&self) -> WalletResult<bool> {
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn request_access(&self) -> WalletResult<()> {
        self.granted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_address(&self) -> WalletResult<String> {
        Ok(self.address.clone())
    }

    async fn sign_transaction(
        &self,
        envelope_xdr: &str,
        _network_passphrase: &str,
    ) -> WalletResult<String> {
        Ok(format!("{}:signed", envelope_xdr))
    }
}

/// Scripted ledger. Queued responses are `(delay, native balance)`; when the
/// queue is empty every account holds `default_native`.
pub struct MockLedger {
    pub calls: AtomicUsize,
    queued: Mutex<VecDeque<(Duration, WalletResult<&'static str>)>>,
    default_native: &'static str,
    pub submitted: Mutex<Vec<String>>,
    reject_with: Mutex<Option<Vec<String>>>,
}

impl MockLedger {
    pub fn new(default_native: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            queued: Mutex::new(VecDeque::new()),
            default_native,
            submitted: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
        })
    }

    pub fn queue(&self, delay: Duration, native: WalletResult<&'static str>) {
        self.queued.lock().unwrap().push_back((delay, native));
    }

    pub fn reject(&self, codes: &[&str]) {
        *self.reject_with.lock().unwrap() = Some(codes.iter().map(|c| c.to_string()).collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn load_account(&self, public_key: &str) -> WalletResult<AccountRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queued.lock().unwrap().pop_front();
        let (delay, native) = next.unwrap_or((Duration::ZERO, Ok(self.default_native)));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(AccountRecord {
            account_id: public_key.to_string(),
            balances: vec![BalanceEntry {
                asset_type: "native".into(),
                asset_code: None,
                issuer: None,
                amount: native?.to_string(),
            }],
        })
    }

    async fn submit_transaction(&self, signed_envelope_xdr: &str) -> WalletResult<String> {
        if let Some(codes) = self.reject_with.lock().unwrap().clone() {
            return Err(WalletError::SubmissionRejected(codes));
        }
        self.submitted.lock().unwrap().push(signed_envelope_xdr.to_string());
        Ok("c0ffee".into())
    }
}

#[derive(Default)]
pub struct MockWidget {
    pub opened: Mutex<Vec<WidgetParams>>,
}

#[async_trait]
impl PaymentWidget for MockWidget {
    async fn open(&self, params: &WidgetParams) -> WalletResult<WidgetSession> {
        self.opened.lock().unwrap().push(params.clone());
        Ok(WidgetSession { id: "widget-1".into(), url: "https://pay.example.com/w/1".into() })
    }
}

/// Unsigned one-payment envelope from `source`, base64 XDR.
pub fn unsigned_envelope(source: &str) -> String {
    use stellar_xdr::curr::{
        Asset, Limits, Memo, MuxedAccount, Operation, OperationBody, PaymentOp, Preconditions,
        SequenceNumber, Transaction, TransactionEnvelope, TransactionExt, TransactionV1Envelope,
        Uint256, VecM, WriteXdr,
    };

    let source = wallet_session::identity::decode_account_id(source).expect("account id");
    let payment = Operation {
        source_account: None,
        body: OperationBody::Payment(PaymentOp {
            destination: MuxedAccount::Ed25519(Uint256([0u8; 32])),
            asset: Asset::Native,
            amount: 25_000_000,
        }),
    };
    let tx = Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(source)),
        fee: 100,
        seq_num: SequenceNumber(42),
        cond: Preconditions::None,
        memo: Memo::None,
        operations: vec![payment].try_into().expect("one operation"),
        ext: TransactionExt::V0,
    };
    TransactionEnvelope::Tx(TransactionV1Envelope { tx, signatures: VecM::default() })
        .to_xdr_base64(Limits::none())
        .expect("encode envelope")
}

/// Let spawned tasks run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
