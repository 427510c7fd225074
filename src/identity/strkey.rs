//! StrKey - the ledger's text encoding for keys.
//!
//! `base32(version_byte || payload || crc16_xmodem_le(version_byte || payload))`
//!
//! | Kind | Version byte | Prefix |
//! |------|--------------|--------|
//! | Account id (ed25519 public key) | `6 << 3` | `G` |
//! | Secret seed (ed25519 seed) | `18 << 3` | `S` |
//!
//! The codec itself is `stellar_strkey`; this module adds the shape checks
//! that give callers a useful error.

use stellar_strkey::ed25519::{PrivateKey, PublicKey};

/// 1 version byte + 32 key bytes + 2 checksum bytes, base32 without padding.
pub const ENCODED_LEN: usize = 56;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrKeyError {
    #[error("expected 56 characters, got {0}")]
    InvalidLength(usize),
    #[error("expected an account id starting with 'G', got {0:?}")]
    InvalidPrefix(char),
    #[error("malformed account id: {0}")]
    Malformed(String),
}

pub fn encode_account_id(key: &[u8; 32]) -> String {
    PublicKey(*key).to_string()
}

pub fn encode_secret_seed(seed: &[u8; 32]) -> String {
    PrivateKey(*seed).to_string()
}

pub fn decode_account_id(text: &str) -> Result<[u8; 32], StrKeyError> {
    if text.len() != ENCODED_LEN {
        return Err(StrKeyError::InvalidLength(text.len()));
    }
    match text.chars().next() {
        Some('G') => {}
        Some(other) => return Err(StrKeyError::InvalidPrefix(other)),
        None => return Err(StrKeyError::InvalidLength(0)),
    }
    PublicKey::from_string(text)
        .map(|key| key.0)
        .map_err(|e| StrKeyError::Malformed(e.to_string()))
}

/// True when `text` is a well-formed account id with a valid checksum.
pub fn is_account_id(text: &str) -> bool {
    decode_account_id(text).is_ok()
}
