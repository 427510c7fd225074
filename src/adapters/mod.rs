//! Provider adapters - one external identity/wallet SDK each, one contract for all.
//!
//! # Architecture
//!
//! ```text
//! ProviderAdapter (trait)
//!     │
//!     ├── PopupIdentityAdapter ── IdentityProvider (popup login SDK)
//!     ├── DirectWalletAdapter ─── WalletExtension (browser extension) or manual entry
//!     └── LegacyPopupAdapter ──── IdentityProvider again, with secret handoff
//!
//! every adapter owns an AdapterCore:
//!     state machine + retry/backoff + listeners
//! ```
//!
//! # Lifecycle
//!
//! | From | Event | To |
//! |------|-------|----|
//! | uninitialized, error | `initialize()` | initializing |
//! | initializing | handshake ok | ready |
//! | initializing | rate limited, retries left | rate-limited → (backoff) → initializing |
//! | initializing | rate limited, cap reached / other failure / timeout | error |
//! | ready | `disconnect()` (logout) | uninitialized |
//!
//! Lifecycle failures are absorbed into the state. `connect()` and signing
//! failures are returned to the caller.

mod direct;
mod legacy;
mod lifecycle;
mod popup;

pub use direct::{DirectWalletAdapter, WalletExtension};
pub use legacy::LegacyPopupAdapter;
pub use lifecycle::{AdapterCore, Listener};
pub use popup::{
    IdentityProvider, PopupIdentityAdapter, ProviderHandle, UserInfo, PRIVATE_KEY_METHOD,
};

use crate::errors::{WalletError, WalletResult};
use crate::session::ConnectionSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterStatus {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    RateLimited,
    Error,
}

impl AdapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterStatus::Uninitialized => "uninitialized",
            AdapterStatus::Initializing => "initializing",
            AdapterStatus::Ready => "ready",
            AdapterStatus::RateLimited => "rate-limited",
            AdapterStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterState {
    pub status: AdapterStatus,
    pub public_key: Option<String>,
    pub connected: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterEventKind {
    StatusChanged,
    Connected,
    /// Connection dropped without a user logout (e.g. extension revoked access).
    Disconnected,
    LoggedOut,
}

/// State-change notification. `seq` increases per adapter, so a listener can
/// drop anything older than what it has already seen.
#[derive(Debug, Clone)]
pub struct AdapterEvent {
    pub source: ConnectionSource,
    pub seq: u64,
    pub kind: AdapterEventKind,
    pub state: AdapterState,
}

/// Retry/backoff and timeout settings for SDK initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub init_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
            init_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// `2^retry_count * base_delay`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.base_delay.saturating_mul(1u32.checked_shl(retry_count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn core(&self) -> &AdapterCore;

    /// Run the SDK handshake. Returns at once when already initializing,
    /// backing off, or ready. From `error` it starts over (manual retry).
    async fn initialize(&self) -> AdapterStatus;

    /// Requires `ready`. Returns the connected account id.
    async fn connect(&self) -> WalletResult<String>;

    /// Logout: clears local and persisted state. Never fails.
    async fn disconnect(&self);

    /// Re-check a live connection against the SDK.
    async fn revalidate(&self) {}

    async fn sign_transaction(
        &self,
        _envelope_xdr: &str,
        _network_passphrase: &str,
    ) -> WalletResult<String> {
        Err(WalletError::InvalidRequest(format!("{} cannot sign transactions", self.source())))
    }

    async fn sign_message(&self, _payload: &[u8]) -> WalletResult<Vec<u8>> {
        Err(WalletError::InvalidRequest(format!("{} cannot sign messages", self.source())))
    }

    fn source(&self) -> ConnectionSource {
        self.core().source()
    }
    fn status(&self) -> AdapterStatus {
        self.core().status()
    }
    fn public_key(&self) -> Option<String> {
        self.core().public_key()
    }
    fn state(&self) -> AdapterState {
        self.core().state()
    }
    fn snapshot(&self) -> AdapterEvent {
        self.core().snapshot()
    }
    fn subscribe(&self, listener: Listener) {
        self.core().subscribe(listener)
    }
}
