//! Ledger network client contract.
//!
//! | Call | Success | Failure |
//! |------|---------|---------|
//! | `load_account(pk)` | ordered balance entries | `NotFound` for an unknown (unfunded) account |
//! | `submit_transaction(xdr)` | transaction hash | `SubmissionRejected(result codes)` |

#[cfg(feature = "native")]
mod horizon;

#[cfg(feature = "native")]
pub use horizon::HorizonClient;

use crate::errors::{WalletError, WalletResult};
use crate::session::{Amount, AssetLine, Balance, ParseAmountError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ledger network selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Public,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Public => "public",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "testnet" | "test" => Some(Network::Testnet),
            "public" | "mainnet" | "pubnet" => Some(Network::Public),
            _ => None,
        }
    }

    pub fn horizon_url(&self) -> &'static str {
        match self {
            Network::Testnet => "https://horizon-testnet.stellar.org",
            Network::Public => "https://horizon.stellar.org",
        }
    }

    /// Passphrase signed into every transaction for this network.
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Testnet => "Test SDF Network ; September 2015",
            Network::Public => "Public Global Stellar Network ; September 2015",
        }
    }
}

/// One entry of an account's balance list, as the ledger reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default, rename = "asset_issuer")]
    pub issuer: Option<String>,
    #[serde(rename = "balance")]
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub account_id: String,
    pub balances: Vec<BalanceEntry>,
}

impl AccountRecord {
    /// Split into the native amount and ordered asset lines.
    pub fn to_balance(&self) -> WalletResult<Balance> {
        let mut balance = Balance::empty();
        for entry in &self.balances {
            let amount: Amount = entry
                .amount
                .parse()
                .map_err(|e: ParseAmountError| WalletError::Network(e.to_string()))?;
            if entry.asset_type == "native" {
                balance.native = amount;
                continue;
            }
            balance.lines.push(AssetLine {
                code: entry.asset_code.clone().unwrap_or_else(|| entry.asset_type.clone()),
                issuer: entry.issuer.clone().unwrap_or_default(),
                amount,
            });
        }
        Ok(balance)
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn load_account(&self, public_key: &str) -> WalletResult<AccountRecord>;

    /// Submit a signed envelope; returns the transaction hash.
    async fn submit_transaction(&self, signed_envelope_xdr: &str) -> WalletResult<String>;

    fn network(&self) -> Network {
        Network::default()
    }
}
