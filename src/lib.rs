//! Wallet session: one logical wallet session over several independently
//! initializing identity and wallet providers.
//!
//! # Architecture
//!
//! ```text
//! Node (entry point)
//!   │
//!   ├── Adapters (each wraps one external SDK, own lifecycle + retry)
//!   │     ├── popup-identity  ── IdentityProvider, key derived from provider secret
//!   │     ├── direct-wallet   ── WalletExtension or manual account id
//!   │     └── legacy-popup    ── IdentityProvider via the older handoff path
//!   │
//!   ├── Reconciler (adapter events → precedence → SessionStore)
//!   │
//!   ├── BalancePoller (connected key → ledger every 30s → SessionStore)
//!   │
//!   └── PaymentBridge (buy intent → fiat widget launch)
//! ```
//!
//! # Session
//!
//! | Field | Written by | Meaning |
//! |-------|-----------|---------|
//! | `publicKey` | reconciler | Account id of the winning adapter, or the restored one |
//! | `isConnected` | reconciler | Any adapter connected |
//! | `connectionSource` | reconciler | Which adapter supplied the key |
//! | `balance` | poller | Last successful ledger query for that key |
//!
//! # Features
//!
//! - `native` (default) - Horizon and pinning HTTP clients, file-backed
//!   persistence, HTTP server, logging setup, CLI
//!
//! # Usage
//!
//! ```ignore
//! use wallet_session::{ConnectionSource, Node, NodeConfig};
//!
//! let node = Node::builder(NodeConfig::from_env()?)
//!     .with_identity_provider(provider)
//!     .with_extension(extension)
//!     .build()?;
//! node.start();
//!
//! node.connect(ConnectionSource::PopupIdentity).await?;
//! let session = node.session();
//! ```

// =============================================================================
// Core (compiles everywhere)
// =============================================================================
pub mod adapters;
pub mod clock;
pub mod errors;
pub mod identity;
pub mod ledger;
pub mod node;
pub mod payment;
pub mod pinning;
pub mod poller;
pub mod reconciler;
pub mod runtime;
pub mod session;
pub mod store;

// =============================================================================
// Native-only modules (server, logging setup)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod server;

// =============================================================================
// Re-exports
// =============================================================================
pub use adapters::{AdapterState, AdapterStatus, ProviderAdapter, RetryPolicy};
pub use errors::{WalletError, WalletResult};
pub use identity::{derive_public_key, Identity};
pub use ledger::{LedgerClient, Network};
pub use node::{Node, NodeBuilder, NodeConfig};
pub use payment::{BuyRequest, PaymentBridge};
pub use reconciler::Reconciler;
pub use runtime::Shutdown;
pub use session::{Balance, ConnectionSource, Session, SessionStore};

#[cfg(feature = "native")]
pub use ledger::HorizonClient;
#[cfg(feature = "native")]
pub use runtime::install_signal_handlers;
#[cfg(feature = "native")]
pub use server::create_router;
