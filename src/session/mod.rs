//! Session - the reconciled wallet view and its observable store.
//!
//! ```text
//! Reconciler ──set_identity──┐
//!                            ▼
//!                      SessionStore (tokio watch) ──subscribe──▶ UI, PaymentBridge, server
//!                            ▲
//! BalancePoller ─apply_balance┘
//! ```
//!
//! Only the reconciler and the poller write; the write methods are crate-private.

mod amount;

pub use amount::{Amount, ParseAmountError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Which adapter supplied the current identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionSource {
    #[default]
    None,
    PopupIdentity,
    DirectWallet,
    LegacyPopup,
}

impl ConnectionSource {
    pub const ADAPTERS: [ConnectionSource; 3] = [
        ConnectionSource::PopupIdentity,
        ConnectionSource::DirectWallet,
        ConnectionSource::LegacyPopup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionSource::None => "none",
            ConnectionSource::PopupIdentity => "popup-identity",
            ConnectionSource::DirectWallet => "direct-wallet",
            ConnectionSource::LegacyPopup => "legacy-popup",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(ConnectionSource::None),
            "popup-identity" | "popup" => Some(ConnectionSource::PopupIdentity),
            "direct-wallet" | "direct" | "wallet" => Some(ConnectionSource::DirectWallet),
            "legacy-popup" | "legacy" => Some(ConnectionSource::LegacyPopup),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session was established. Persisted next to the public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMethod {
    PopupLogin,
    WalletExtension,
    ManualEntry,
    LegacyPopupLogin,
}

impl ConnectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMethod::PopupLogin => "popup-login",
            ConnectionMethod::WalletExtension => "wallet-extension",
            ConnectionMethod::ManualEntry => "manual-entry",
            ConnectionMethod::LegacyPopupLogin => "legacy-popup-login",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "popup-login" => Some(ConnectionMethod::PopupLogin),
            "wallet-extension" => Some(ConnectionMethod::WalletExtension),
            "manual-entry" => Some(ConnectionMethod::ManualEntry),
            "legacy-popup-login" => Some(ConnectionMethod::LegacyPopupLogin),
            _ => None,
        }
    }

    pub fn source(&self) -> ConnectionSource {
        match self {
            ConnectionMethod::PopupLogin => ConnectionSource::PopupIdentity,
            ConnectionMethod::WalletExtension | ConnectionMethod::ManualEntry => {
                ConnectionSource::DirectWallet
            }
            ConnectionMethod::LegacyPopupLogin => ConnectionSource::LegacyPopup,
        }
    }
}

/// One non-native balance line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLine {
    pub code: String,
    pub issuer: String,
    pub amount: Amount,
}

/// Last-polled balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub native: Amount,
    pub lines: Vec<AssetLine>,
    pub fetched_at: DateTime<Utc>,
}

impl Balance {
    /// Balance of an account the ledger does not know yet.
    pub fn empty() -> Self {
        Self { native: Amount::ZERO, lines: Vec::new(), fetched_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub public_key: Option<String>,
    pub is_connected: bool,
    pub connection_source: ConnectionSource,
    pub balance: Option<Balance>,
}

/// Identity half of a session, as computed by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub public_key: Option<String>,
    pub is_connected: bool,
    pub connection_source: ConnectionSource,
}

/// Process-wide observable session. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Session>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Session::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Replace the identity fields. A different account drops the balance.
    pub(crate) fn set_identity(&self, identity: SessionIdentity) -> bool {
        self.tx.send_if_modified(|session| {
            let unchanged = session.public_key == identity.public_key
                && session.is_connected == identity.is_connected
                && session.connection_source == identity.connection_source;
            if unchanged {
                return false;
            }
            if session.public_key != identity.public_key {
                session.balance = None;
            }
            session.public_key = identity.public_key;
            session.is_connected = identity.is_connected;
            session.connection_source = identity.connection_source;
            true
        })
    }

    /// Store a balance fetched for `queried_key`. Rejected when the session has
    /// moved on (disconnected or switched account) since the query started.
    pub(crate) fn apply_balance(&self, queried_key: &str, balance: Balance) -> bool {
        self.tx.send_if_modified(|session| {
            if !session.is_connected || session.public_key.as_deref() != Some(queried_key) {
                return false;
            }
            session.balance = Some(balance);
            true
        })
    }

    /// Back to the empty session (logout).
    pub(crate) fn reset(&self) {
        self.tx.send_if_modified(|session| {
            if *session == Session::default() {
                return false;
            }
            *session = Session::default();
            true
        });
    }
}
