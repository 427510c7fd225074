//! Horizon REST client.

use super::{AccountRecord, LedgerClient, Network};
use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

pub struct HorizonClient {
    base_url: String,
    network: Network,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemExtras {
    #[serde(default)]
    result_codes: Option<ResultCodes>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    operations: Vec<String>,
}

impl ResultCodes {
    fn flatten(self) -> Vec<String> {
        self.transaction.into_iter().chain(self.operations).collect()
    }
}

impl HorizonClient {
    pub fn new(network: Network) -> Self {
        Self::with_url(network, network.horizon_url())
    }

    pub fn with_url(network: Network, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport(e: reqwest::Error) -> WalletError {
    WalletError::Network(e.to_string())
}

fn status_error(status: StatusCode, title: &str) -> WalletError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => WalletError::RateLimited(format!("horizon: {}", title)),
        s if s.is_server_error() => {
            WalletError::Network(format!("horizon {}: {}", s.as_u16(), title))
        }
        s => WalletError::InvalidRequest(format!("horizon {}: {}", s.as_u16(), title)),
    }
}

#[async_trait]
impl LedgerClient for HorizonClient {
    async fn load_account(&self, public_key: &str) -> WalletResult<AccountRecord> {
        let url = format!("{}/accounts/{}", self.base_url, public_key);
        let resp = self.client.get(&url).send().await.map_err(transport)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WalletError::NotFound(public_key.to_string()));
        }
        if !status.is_success() {
            let problem: Problem = resp.json().await.unwrap_or_default();
            return Err(status_error(status, &problem.title));
        }
        resp.json().await.map_err(transport)
    }

    async fn submit_transaction(&self, signed_envelope_xdr: &str) -> WalletResult<String> {
        let url = format!("{}/transactions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .form(&[("tx", signed_envelope_xdr)])
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            let body: SubmitResponse = resp.json().await.map_err(transport)?;
            tracing::info!("submitted transaction {}", body.hash);
            return Ok(body.hash);
        }
        let problem: Problem = resp.json().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            if let Some(codes) = problem.extras.and_then(|x| x.result_codes) {
                let codes = codes.flatten();
                tracing::warn!("transaction rejected: {:?}", codes);
                return Err(WalletError::SubmissionRejected(codes));
            }
        }
        Err(status_error(status, &problem.title))
    }

    fn network(&self) -> Network {
        self.network
    }
}
