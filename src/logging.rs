//! Tracing setup for the binary and embedding hosts.
//!
//! `RUST_LOG` sets the filter (default `info`); `WALLET_SESSION_LOG_JSON=1`
//! switches stderr output to JSON lines.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_VAR: &str = "WALLET_SESSION_LOG_JSON";

fn json_enabled(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("1") | Some("true"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = json_enabled(std::env::var(LOG_JSON_VAR).ok().as_deref());

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .pretty()
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_switch() {
        assert!(json_enabled(Some("1")));
        assert!(json_enabled(Some("true ")));
        assert!(!json_enabled(Some("0")));
        assert!(!json_enabled(None));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging();
        init_logging();
        tracing::info!("logging ready");
    }
}
