//! Identity - derives a ledger keypair from a provider secret.
//!
//! Popup-login providers hand back a generic private key (usually 32 bytes of
//! hex). The ledger wants ed25519, so the secret is hashed to a 32-byte seed
//! and the keypair is derived from that seed:
//!
//! ```text
//! raw secret ──canonical──▶ bytes ──SHA-256──▶ seed ──ed25519──▶ G... account id
//! ```
//!
//! Same secret, same account id. The account id never leads back to the secret.

mod envelope;
mod strkey;

pub use envelope::signature_hash;
#[cfg(test)]
pub(crate) use envelope::payment_envelope;
pub use strkey::{
    decode_account_id, encode_account_id, encode_secret_seed, is_account_id, StrKeyError,
};

use crate::errors::{WalletError, WalletResult};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    public_key: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").field("public_key", &self.public_key).finish_non_exhaustive()
    }
}

impl Identity {
    /// Derive from a raw provider secret.
    pub fn from_secret(raw_secret: &str) -> WalletResult<Self> {
        let canonical = canonical_secret(raw_secret)?;
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&Sha256::digest(canonical.as_slice()));
        Ok(Self::from_seed(&seed))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let public_key = encode_account_id(signing_key.verifying_key().as_bytes());
        Self { signing_key, public_key }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Detached ed25519 signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        self.signing_key.sign(payload).to_bytes()
    }

    /// Secret seed in ledger text form (`S...`).
    pub fn secret_seed(&self) -> Zeroizing<String> {
        Zeroizing::new(encode_secret_seed(&self.signing_key.to_bytes()))
    }
}

/// Derive only the account id for a secret.
pub fn derive_public_key(raw_secret: &str) -> WalletResult<String> {
    Identity::from_secret(raw_secret).map(|id| id.public_key)
}

/// Canonical byte form of a provider secret: hex secrets (with or without
/// `0x`, any case) decode to their bytes; anything else is its trimmed UTF-8.
fn canonical_secret(raw: &str) -> WalletResult<Zeroizing<Vec<u8>>> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.is_empty() {
        return Err(WalletError::Derivation("empty secret".into()));
    }
    if body.len() % 2 == 0 && body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(body)
            .map(Zeroizing::new)
            .map_err(|e| WalletError::Derivation(format!("secret hex: {e}")));
    }
    Ok(Zeroizing::new(trimmed.as_bytes().to_vec()))
}
