//! Balance poller - keeps `Session.balance` fresh while connected.
//!
//! ```text
//! session: connected ──▶ query now, then every `interval`
//!          disconnected ──▶ schedule cancelled (in-flight queries finish)
//!          key changed ──▶ query now, timer reset
//!          balance cleared, same key ──▶ query now, timer reset
//! refresh() ──▶ query now, timer reset
//!
//! query(pk) ──▶ ledger.load_account(pk) ──▶ store.apply_balance(pk, ..)
//!                                            (dropped unless pk is still the connected key)
//! ```

use crate::errors::{WalletError, WalletResult};
use crate::ledger::LedgerClient;
use crate::runtime::Shutdown;
use crate::session::{Balance, Session, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

type RefreshReply = oneshot::Sender<WalletResult<()>>;

#[derive(Clone)]
pub struct BalancePoller {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<SessionStore>,
    interval: Duration,
}

/// Requests an immediate query from a running poller.
#[derive(Clone)]
pub struct Refresher(mpsc::Sender<RefreshReply>);

impl Refresher {
    /// Query now and restart the interval. Fails with `InvalidRequest` when
    /// no wallet is connected, without touching the ledger.
    pub async fn refresh(&self) -> WalletResult<()> {
        let stopped = || WalletError::InvalidRequest("balance poller stopped".into());
        let (tx, rx) = oneshot::channel();
        self.0.send(tx).await.map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }
}

/// Handle to a running poller.
pub struct PollerHandle {
    refresher: Refresher,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn refresh(&self) -> WalletResult<()> {
        self.refresher.refresh().await
    }

    pub fn refresher(&self) -> Refresher {
        self.refresher.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("balance poller task failed: {}", e);
        }
    }
}

fn active_key(session: &Session) -> Option<String> {
    if session.is_connected { session.public_key.clone() } else { None }
}

impl BalancePoller {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<SessionStore>) -> Self {
        Self { ledger, store, interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One balance query for `public_key`. The result is stored only if
    /// `public_key` is still the connected account when it arrives.
    pub async fn query(&self, public_key: &str) -> WalletResult<()> {
        let balance = match self.ledger.load_account(public_key).await {
            Ok(record) => record.to_balance(),
            Err(WalletError::NotFound(_)) => {
                tracing::debug!("{} not on ledger yet; empty balance", public_key);
                Ok(Balance::empty())
            }
            Err(e) => Err(e),
        };
        match balance {
            Ok(balance) => {
                if !self.store.apply_balance(public_key, balance) {
                    tracing::debug!("discarding stale balance for {}", public_key);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("balance query for {} failed: {}", public_key, e);
                Err(e)
            }
        }
    }

    fn spawn_query(&self, public_key: String, reply: Option<RefreshReply>) {
        let poller = self.clone();
        tokio::spawn(async move {
            let result = poller.query(&public_key).await;
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        });
    }

    pub fn spawn(self, shutdown: Shutdown) -> PollerHandle {
        let (refresh, refresh_rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(shutdown, refresh_rx));
        PollerHandle { refresher: Refresher(refresh), task }
    }

    async fn run(self, shutdown: Shutdown, mut refresh_rx: mpsc::Receiver<RefreshReply>) {
        let mut session_rx = self.store.subscribe();
        let mut tracked = active_key(&session_rx.borrow_and_update());
        let mut next: Option<Instant> = None;
        if let Some(pk) = &tracked {
            self.spawn_query(pk.clone(), None);
            next = Some(Instant::now() + self.interval);
        }

        loop {
            let deadline = next;
            let tick = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = shutdown.wait() => {
                    tracing::debug!("balance poller stopping");
                    break;
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let (active, missing_balance) = {
                        let session = session_rx.borrow_and_update();
                        (active_key(&session), session.is_connected && session.balance.is_none())
                    };
                    if active == tracked {
                        // Same account, but a logout elsewhere wiped its balance.
                        if let (Some(pk), true) = (&tracked, missing_balance) {
                            self.spawn_query(pk.clone(), None);
                            next = Some(Instant::now() + self.interval);
                        }
                        continue;
                    }
                    tracked = active;
                    match &tracked {
                        Some(pk) => {
                            tracing::info!("polling balance for {} every {:?}", pk, self.interval);
                            self.spawn_query(pk.clone(), None);
                            next = Some(Instant::now() + self.interval);
                        }
                        None => {
                            tracing::info!("balance polling cancelled");
                            next = None;
                        }
                    }
                }
                Some(reply) = refresh_rx.recv() => match &tracked {
                    Some(pk) => {
                        self.spawn_query(pk.clone(), Some(reply));
                        next = Some(Instant::now() + self.interval);
                    }
                    None => {
                        let err = WalletError::InvalidRequest("connect your wallet first".into());
                        let _ = reply.send(Err(err));
                    }
                },
                _ = tick => {
                    if let Some(pk) = &tracked {
                        self.spawn_query(pk.clone(), None);
                    }
                    next = tracked.as_ref().map(|_| Instant::now() + self.interval);
                }
            }
        }
    }
}
