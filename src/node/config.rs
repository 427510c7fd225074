//! Node Configuration - built by the host, or read from `WALLET_SESSION_*`

use crate::adapters::RetryPolicy;
use crate::errors::{WalletError, WalletResult};
use crate::ledger::Network;
use crate::payment::HostedWidgetConfig;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::reconciler::{validate_precedence, DEFAULT_PRECEDENCE};
use crate::session::ConnectionSource;
use std::path::PathBuf;
use std::time::Duration;

/// Pinning service settings.
#[derive(Clone, Default)]
pub struct PinningConfig {
    pub api_url: Option<String>,
    pub jwt: String,
    pub gateway: Option<String>,
}

impl std::fmt::Debug for PinningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinningConfig")
            .field("api_url", &self.api_url)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

/// Node configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub app: String,
    pub network: Network,
    pub horizon_url: Option<String>,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Adapters to build.
    pub adapters: Vec<ConnectionSource>,
    /// Highest first; always all three adapters.
    pub precedence: Vec<ConnectionSource>,
    pub widget: Option<HostedWidgetConfig>,
    pub pinning: Option<PinningConfig>,
    pub data_dir: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            app: "wallet-session".into(),
            network: Network::default(),
            horizon_url: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            adapters: ConnectionSource::ADAPTERS.to_vec(),
            precedence: DEFAULT_PRECEDENCE.to_vec(),
            widget: None,
            pinning: None,
            data_dir: None,
        }
    }
}

impl NodeConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network; self
    }
    pub fn with_horizon_url(mut self, url: impl Into<String>) -> Self {
        self.horizon_url = Some(url.into()); self
    }
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval; self
    }
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry; self
    }
    pub fn with_adapters(mut self, adapters: Vec<ConnectionSource>) -> Self {
        self.adapters = adapters; self
    }
    pub fn with_precedence(mut self, order: Vec<ConnectionSource>) -> Self {
        self.precedence = order; self
    }
    pub fn with_widget(mut self, widget: HostedWidgetConfig) -> Self {
        self.widget = Some(widget); self
    }
    pub fn with_pinning(mut self, pinning: PinningConfig) -> Self {
        self.pinning = Some(pinning); self
    }
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into()); self
    }

    pub fn is_enabled(&self, source: ConnectionSource) -> bool {
        self.adapters.contains(&source)
    }

    pub fn validate(&self) -> WalletResult<()> {
        validate_precedence(&self.precedence)?;
        if self.adapters.is_empty() {
            return Err(WalletError::InvalidRequest("no adapters enabled".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(WalletError::InvalidRequest("poll interval must be positive".into()));
        }
        Ok(())
    }

    /// Read `WALLET_SESSION_*` overrides on top of the defaults.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `WALLET_SESSION_APP` | app |
    /// | `WALLET_SESSION_NETWORK` | testnet / public |
    /// | `WALLET_SESSION_HORIZON_URL` | ledger endpoint |
    /// | `WALLET_SESSION_POLL_SECS` | poll interval |
    /// | `WALLET_SESSION_MAX_RETRIES`, `_RETRY_BASE_MS`, `_INIT_TIMEOUT_SECS` | retry policy |
    /// | `WALLET_SESSION_ADAPTERS`, `_PRECEDENCE` | comma-separated adapter names |
    /// | `WALLET_SESSION_WIDGET_URL`, `_WIDGET_API_KEY`, `_WIDGET_SECRET` | payment widget |
    /// | `WALLET_SESSION_PINATA_JWT`, `_PINATA_API_URL`, `_PINATA_GATEWAY` | pinning |
    /// | `WALLET_SESSION_DATA_DIR` | persisted identity file |
    pub fn from_env() -> WalletResult<Self> {
        let mut config = Self::new(var("APP").unwrap_or_else(|| "wallet-session".into()));
        if let Some(v) = var("NETWORK") {
            config.network = Network::from_str(&v).ok_or_else(|| invalid("NETWORK", &v))?;
        }
        config.horizon_url = var("HORIZON_URL");
        if let Some(secs) = parsed::<u64>("POLL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(n) = parsed::<u32>("MAX_RETRIES")? {
            config.retry.max_retries = n;
        }
        if let Some(ms) = parsed::<u64>("RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed::<u64>("INIT_TIMEOUT_SECS")? {
            config.retry.init_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = var("ADAPTERS") {
            config.adapters = sources("ADAPTERS", &v)?;
        }
        if let Some(v) = var("PRECEDENCE") {
            config.precedence = sources("PRECEDENCE", &v)?;
        }
        if let Some(api_key) = var("WIDGET_API_KEY") {
            config.widget = Some(HostedWidgetConfig {
                base_url: var("WIDGET_URL").unwrap_or_default(),
                api_key,
                secret_key: var("WIDGET_SECRET"),
            });
        }
        if let Some(jwt) = var("PINATA_JWT") {
            config.pinning = Some(PinningConfig {
                api_url: var("PINATA_API_URL"),
                jwt,
                gateway: var("PINATA_GATEWAY"),
            });
        }
        config.data_dir = var("DATA_DIR").map(PathBuf::from);
        config.validate()?;
        Ok(config)
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(format!("WALLET_SESSION_{}", name)).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(name: &str, value: &str) -> WalletError {
    WalletError::InvalidRequest(format!("WALLET_SESSION_{}: unrecognised value {:?}", name, value))
}

fn parsed<T: std::str::FromStr>(name: &str) -> WalletResult<Option<T>> {
    var(name).map(|v| v.trim().parse().map_err(|_| invalid(name, &v))).transpose()
}

fn sources(name: &str, value: &str) -> WalletResult<Vec<ConnectionSource>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match ConnectionSource::from_str(s) {
            Some(ConnectionSource::None) | None => Err(invalid(name, s)),
            Some(source) => Ok(source),
        })
        .collect()
}
