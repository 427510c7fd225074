//! Hosted fiat on-ramp widget: launches are URLs the front-end opens.
//!
//! With a secret key configured the query string is signed:
//! `signature = base64(HMAC-SHA256(secret, "?" + query))`, appended last.

use super::{PaymentWidget, WidgetParams, WidgetSession};
use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_WIDGET_URL: &str = "https://buy-sandbox.moonpay.com";

#[derive(Clone, Default)]
pub struct HostedWidgetConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for HostedWidgetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedWidgetConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct HostedWidget {
    base: Url,
    api_key: String,
    secret_key: Option<String>,
}

impl HostedWidget {
    pub fn new(config: HostedWidgetConfig) -> WalletResult<Self> {
        let base_url = if config.base_url.is_empty() {
            DEFAULT_WIDGET_URL
        } else {
            config.base_url.as_str()
        };
        let base = Url::parse(base_url)
            .map_err(|e| WalletError::InvalidRequest(format!("widget url {:?}: {}", base_url, e)))?;
        if config.api_key.is_empty() {
            return Err(WalletError::InvalidRequest("widget api key missing".into()));
        }
        Ok(Self {
            base,
            api_key: config.api_key,
            secret_key: config.secret_key.filter(|s| !s.is_empty()),
        })
    }

    /// Launch URL for `params` under widget session `id`.
    pub fn launch_url(&self, params: &WidgetParams, id: &str) -> WalletResult<Url> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("apiKey", &self.api_key)
            .append_pair("walletAddress", &params.destination_address)
            .append_pair("baseCurrencyAmount", &params.fiat_amount.to_string())
            .append_pair("baseCurrencyCode", &params.fiat_currency.to_ascii_lowercase())
            .append_pair("currencyCode", &params.crypto_currency.to_ascii_lowercase())
            .append_pair("externalTransactionId", id);
        if let Some(secret) = &self.secret_key {
            let signature = sign_query(secret, url.query().unwrap_or_default())?;
            url.query_pairs_mut().append_pair("signature", &signature);
        }
        Ok(url)
    }
}

fn sign_query(secret: &str, query: &str) -> WalletResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WalletError::InvalidRequest(format!("widget secret: {}", e)))?;
    mac.update(b"?");
    mac.update(query.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Short id unique per launch.
fn session_id(params: &WidgetParams) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let digest = Sha256::new()
        .chain_update(params.destination_address.as_bytes())
        .chain_update(params.fiat_amount.to_be_bytes())
        .chain_update(nanos.to_be_bytes())
        .finalize();
    hex::encode(&digest[..8])
}

#[async_trait]
impl PaymentWidget for HostedWidget {
    async fn open(&self, params: &WidgetParams) -> WalletResult<WidgetSession> {
        let id = session_id(params);
        let url = self.launch_url(params, &id)?;
        Ok(WidgetSession { id, url: url.into() })
    }
}
