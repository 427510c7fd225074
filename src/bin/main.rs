//! wallet-session CLI
//!
//!   wallet-session derive --secret <hex|text>   → {"publicKey": "G..."}
//!   wallet-session balance <account>            → native + asset lines
//!   wallet-session validate <account>           → {"valid": true}
//!   wallet-session serve --port 8420            → HTTP session API
//!
//! Configuration comes from `WALLET_SESSION_*` (a `.env` file is loaded first).
//! Output is pretty JSON on a tty, compact otherwise.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::{IsTerminal, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use wallet_session::logging::init_logging;
use wallet_session::identity::is_account_id;
use wallet_session::{
    derive_public_key, install_signal_handlers, HorizonClient, LedgerClient, Node, NodeConfig,
    WalletError,
};

#[derive(Parser)]
#[command(name = "wallet-session", version, about = "Multi-provider wallet session")]
struct Cli {
    /// Force compact JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the ledger account id for a provider secret
    Derive {
        /// Secret (hex or text). Read from stdin when omitted.
        #[arg(long)]
        secret: Option<String>,
    },
    /// Query an account's balance
    Balance { account: String },
    /// Check an account id's checksum and version
    Validate { account: String },
    /// Serve the session API
    Serve {
        #[arg(long, default_value_t = 8420)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_logging();
    let cli = Cli::parse();
    let compact = cli.json || !std::io::stdout().is_terminal();

    match run(cli.command).await {
        Ok(output) => println!("{}", render(&output, compact)),
        Err(e) => {
            eprintln!("{}", render(&json!({ "error": format!("{:#}", e) }), compact));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, compact: bool) -> String {
    let rendered =
        if compact { serde_json::to_string(value) } else { serde_json::to_string_pretty(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

async fn run(command: Commands) -> Result<Value> {
    match command {
        Commands::Derive { secret } => cmd_derive(secret),
        Commands::Balance { account } => cmd_balance(&account).await,
        Commands::Validate { account } => {
            Ok(json!({ "account": account, "valid": is_account_id(account.trim()) }))
        }
        Commands::Serve { port, host } => cmd_serve(&host, port).await,
    }
}

fn cmd_derive(secret: Option<String>) -> Result<Value> {
    let secret = match secret {
        Some(s) => s,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading secret from stdin")?;
            buf
        }
    };
    let public_key = derive_public_key(&secret)?;
    Ok(json!({ "publicKey": public_key }))
}

async fn cmd_balance(account: &str) -> Result<Value> {
    let config = NodeConfig::from_env()?;
    let client = match &config.horizon_url {
        Some(url) => HorizonClient::with_url(config.network, url),
        None => HorizonClient::new(config.network),
    };
    let balance = match client.load_account(account.trim()).await {
        Ok(record) => record.to_balance()?,
        Err(WalletError::NotFound(_)) => wallet_session::Balance::empty(),
        Err(e) => return Err(e).context("querying ledger"),
    };
    Ok(json!({ "account": account, "network": config.network.as_str(), "balance": balance }))
}

async fn cmd_serve(host: &str, port: u16) -> Result<Value> {
    let config = NodeConfig::from_env()?;
    let app = config.app.clone();
    let node = Arc::new(Node::from_config(config).context("building node")?);
    let shutdown = install_signal_handlers();
    node.start();

    let addr: SocketAddr = format!("{}:{}", host, port).parse().context("invalid listen address")?;
    let served = wallet_session::server::serve(node.clone(), &app, addr, shutdown).await;
    node.shutdown().await;
    served.context("http server")?;
    Ok(json!({ "stopped": true }))
}
