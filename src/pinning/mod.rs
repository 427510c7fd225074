//! Content pinning for NFT media and metadata.
//!
//! ```text
//! publish_nft_metadata
//!     ├── pin_file(image)  → image CID
//!     └── pin_json(NftMetadata { image: ipfs://<image CID>, .. }) → metadata CID
//! ```

#[cfg(feature = "native")]
mod pinata;

#[cfg(feature = "native")]
pub use pinata::{PinataClient, PinataConfig};

use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";

#[async_trait]
pub trait PinningService: Send + Sync {
    /// Pin a JSON document; returns its content hash.
    async fn pin_json(&self, content: &serde_json::Value, name: &str) -> WalletResult<String>;
    async fn pin_file(&self, file_name: &str, bytes: Vec<u8>) -> WalletResult<String>;
    fn gateway(&self) -> &str {
        DEFAULT_GATEWAY
    }

    fn gateway_url(&self, hash: &str) -> String {
        format!("{}/{}", self.gateway().trim_end_matches('/'), hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<NftAttribute>,
}

/// What the caller supplies; `image` is filled in after the upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NftDraft {
    pub name: String,
    pub description: String,
    pub attributes: Vec<NftAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedNft {
    pub image_hash: String,
    pub metadata_hash: String,
    pub metadata_url: String,
    pub metadata: NftMetadata,
}

pub async fn publish_nft_metadata(
    service: &dyn PinningService,
    draft: NftDraft,
    image_name: &str,
    image: Vec<u8>,
) -> WalletResult<PublishedNft> {
    if draft.name.trim().is_empty() {
        return Err(WalletError::InvalidRequest("NFT name is required".into()));
    }
    if image.is_empty() {
        return Err(WalletError::InvalidRequest("NFT image is empty".into()));
    }
    let image_hash = service.pin_file(image_name, image).await?;
    let metadata = NftMetadata {
        name: draft.name,
        description: draft.description,
        image: format!("ipfs://{}", image_hash),
        attributes: draft.attributes,
    };
    let content =
        serde_json::to_value(&metadata).map_err(|e| WalletError::InvalidRequest(e.to_string()))?;
    let metadata_hash = service.pin_json(&content, &format!("{}.json", metadata.name)).await?;
    tracing::info!("pinned NFT metadata {} (image {})", metadata_hash, image_hash);
    Ok(PublishedNft {
        metadata_url: service.gateway_url(&metadata_hash),
        image_hash,
        metadata_hash,
        metadata,
    })
}
