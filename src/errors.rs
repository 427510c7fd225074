//! Error taxonomy shared by adapters, ledger, poller and payment bridge.

use crate::session::ConnectionSource;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// Adapter has not finished (or failed) its SDK handshake.
    #[error("{adapter} adapter is not ready{}", rate_limit_suffix(.rate_limited))]
    NotReady { adapter: ConnectionSource, rate_limited: bool },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("transaction rejected: {}", .0.join(", "))]
    SubmissionRejected(Vec<String>),
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage: {0}")]
    Storage(String),
    #[error("provider: {0}")]
    Provider(String),
}

pub type WalletResult<T> = Result<T, WalletError>;

fn rate_limit_suffix(rate_limited: &bool) -> &'static str {
    if *rate_limited { " (rate limited, retrying)" } else { "" }
}

static RATE_LIMIT_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|too many requests|failed to fetch").expect("static regex")
});

impl WalletError {
    /// Whether an SDK failure is throttling (or a bare fetch failure) worth backing off for.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            WalletError::RateLimited(_) | WalletError::Network(_) => true,
            WalletError::Provider(msg) => RATE_LIMIT_SIGNAL.is_match(msg),
            _ => false,
        }
    }

    /// Transient failures a user may retry.
    pub fn is_transient(&self) -> bool {
        self.is_rate_limit() || matches!(self, WalletError::Timeout(_))
    }
}
