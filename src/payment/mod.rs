//! Payment bridge: a "buy" intent becomes one fiat widget launch.
//!
//! Preconditions are checked before the widget is touched:
//!
//! | Check | Failure |
//! |-------|---------|
//! | session connected | `InvalidRequest("connect your wallet first")` |
//! | destination given or session has a key | `InvalidRequest` |
//! | amount finite and > 0 | `InvalidRequest` |
//!
//! One attempt only; widget failures go back to the caller.

mod widget;

pub use widget::{HostedWidget, HostedWidgetConfig};

use crate::errors::{WalletError, WalletResult};
use crate::identity::is_account_id;
use crate::session::SessionStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

pub const DEFAULT_FIAT_CURRENCY: &str = "USD";
pub const DEFAULT_CRYPTO_CURRENCY: &str = "XLM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetParams {
    pub destination_address: String,
    pub fiat_amount: f64,
    pub fiat_currency: String,
    pub crypto_currency: String,
}

/// A launched widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSession {
    pub id: String,
    pub url: String,
}

/// Data the widget reports when a purchase completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletion {
    pub session_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub crypto_amount: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait PaymentWidget: Send + Sync {
    async fn open(&self, params: &WidgetParams) -> WalletResult<WidgetSession>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest {
    /// Defaults to the session's account.
    #[serde(default)]
    pub destination: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub fiat_currency: Option<String>,
    #[serde(default)]
    pub crypto_currency: Option<String>,
}

pub type CompletionListener = Arc<dyn Fn(&PaymentCompletion) + Send + Sync>;

pub struct PaymentBridge {
    widget: Arc<dyn PaymentWidget>,
    session: Arc<SessionStore>,
    listeners: Mutex<Vec<CompletionListener>>,
}

impl PaymentBridge {
    pub fn new(widget: Arc<dyn PaymentWidget>, session: Arc<SessionStore>) -> Self {
        Self { widget, session, listeners: Mutex::new(Vec::new()) }
    }

    /// Resolve the request against the current session.
    pub fn params(&self, request: &BuyRequest) -> WalletResult<WidgetParams> {
        let session = self.session.snapshot();
        if !session.is_connected {
            return Err(WalletError::InvalidRequest("connect your wallet first".into()));
        }
        let destination = match request.destination.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => session
                .public_key
                .ok_or_else(|| WalletError::InvalidRequest("no destination address".into()))?,
        };
        if !is_account_id(&destination) {
            return Err(WalletError::InvalidRequest(format!(
                "{:?} is not a valid account id",
                destination
            )));
        }
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(WalletError::InvalidRequest(format!(
                "amount must be a positive number, got {}",
                request.amount
            )));
        }
        Ok(WidgetParams {
            destination_address: destination,
            fiat_amount: request.amount,
            fiat_currency: request
                .fiat_currency
                .clone()
                .unwrap_or_else(|| DEFAULT_FIAT_CURRENCY.into()),
            crypto_currency: request
                .crypto_currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CRYPTO_CURRENCY.into()),
        })
    }

    pub async fn buy(&self, request: &BuyRequest) -> WalletResult<WidgetSession> {
        let params = self.params(request)?;
        let launched = self.widget.open(&params).await?;
        tracing::info!(
            "payment widget {} opened: {} {} -> {}",
            launched.id, params.fiat_amount, params.fiat_currency, params.destination_address
        );
        Ok(launched)
    }

    pub fn on_payment_completed(&self, listener: CompletionListener) {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).push(listener);
    }

    /// Widget callback entry point.
    pub fn complete(&self, completion: &PaymentCompletion) {
        tracing::info!("payment {} completed", completion.session_id);
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for listener in listeners {
            listener(completion);
        }
    }
}
