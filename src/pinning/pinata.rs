//! Pinata pinning API over reqwest.

use super::{PinningService, DEFAULT_GATEWAY};
use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_API_URL: &str = "https://api.pinata.cloud";

#[derive(Clone, Default)]
pub struct PinataConfig {
    pub api_url: String,
    pub jwt: String,
    pub gateway: String,
}

impl std::fmt::Debug for PinataConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinataConfig")
            .field("api_url", &self.api_url)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

pub struct PinataClient {
    api_url: String,
    jwt: String,
    gateway: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

impl PinataClient {
    pub fn new(config: PinataConfig) -> WalletResult<Self> {
        if config.jwt.is_empty() {
            return Err(WalletError::InvalidRequest("pinning service token missing".into()));
        }
        let or = |value: String, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value
            }
        };
        Ok(Self {
            api_url: or(config.api_url, DEFAULT_API_URL).trim_end_matches('/').to_string(),
            jwt: config.jwt,
            gateway: or(config.gateway, DEFAULT_GATEWAY),
            client: reqwest::Client::new(),
        })
    }

    async fn finish(resp: reqwest::Response) -> WalletResult<String> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WalletError::RateLimited("pinning service".into()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WalletError::Provider(format!(
                "pinning service {}: {}",
                status.as_u16(),
                body
            )));
        }
        let body: PinResponse = resp.json().await.map_err(|e| WalletError::Network(e.to_string()))?;
        Ok(body.ipfs_hash)
    }
}

#[async_trait]
impl PinningService for PinataClient {
    async fn pin_json(&self, content: &serde_json::Value, name: &str) -> WalletResult<String> {
        let body = json!({ "pinataContent": content, "pinataMetadata": { "name": name } });
        let resp = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Network(e.to_string()))?;
        Self::finish(resp).await
    }

    async fn pin_file(&self, file_name: &str, bytes: Vec<u8>) -> WalletResult<String> {
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("pinataMetadata", json!({ "name": file_name }).to_string());
        let resp = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WalletError::Network(e.to_string()))?;
        Self::finish(resp).await
    }

    fn gateway(&self) -> &str {
        &self.gateway
    }
}
