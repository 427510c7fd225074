//! AdapterCore - per-adapter state machine, retry/backoff and listeners.

use super::{AdapterEvent, AdapterEventKind, AdapterState, AdapterStatus, RetryPolicy};
use crate::clock::{self, Clock};
use crate::errors::{WalletError, WalletResult};
use crate::session::ConnectionSource;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// State-change callback. Called outside the adapter's lock, in emission order.
pub type Listener = Arc<dyn Fn(&AdapterEvent) + Send + Sync>;

struct Inner {
    state: AdapterState,
    seq: u64,
}

pub struct AdapterCore {
    source: ConnectionSource,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<Listener>>,
    // Serializes mutate+notify so listeners observe events in seq order.
    emit: Mutex<()>,
}

enum Failure {
    Backoff(Duration),
    Stop,
}

impl AdapterCore {
    pub fn new(source: ConnectionSource, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            source,
            clock,
            policy,
            inner: Mutex::new(Inner { state: AdapterState::default(), seq: 0 }),
            listeners: Mutex::new(Vec::new()),
            emit: Mutex::new(()),
        }
    }

    pub fn source(&self) -> ConnectionSource {
        self.source
    }
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AdapterState {
        self.lock().state.clone()
    }
    pub fn status(&self) -> AdapterStatus {
        self.lock().state.status
    }
    pub fn public_key(&self) -> Option<String> {
        self.lock().state.public_key.clone()
    }
    pub fn is_connected(&self) -> bool {
        self.lock().state.connected
    }

    pub fn snapshot(&self) -> AdapterEvent {
        let inner = self.lock();
        AdapterEvent {
            source: self.source,
            seq: inner.seq,
            kind: AdapterEventKind::StatusChanged,
            state: inner.state.clone(),
        }
    }

    pub fn subscribe(&self, listener: Listener) {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).push(listener);
    }

    /// Mutate the state and notify listeners. `f` returns whether anything changed.
    fn update<R>(
        &self,
        kind: AdapterEventKind,
        f: impl FnOnce(&mut AdapterState) -> (bool, R),
    ) -> R {
        let _order = self.emit.lock().unwrap_or_else(PoisonError::into_inner);
        let (event, out) = {
            let mut inner = self.lock();
            let before = inner.state.status;
            let (changed, out) = f(&mut inner.state);
            if !changed {
                return out;
            }
            inner.seq += 1;
            if before != inner.state.status {
                tracing::info!(
                    "{}: {} -> {}",
                    self.source,
                    before.as_str(),
                    inner.state.status.as_str()
                );
            }
            let event = AdapterEvent {
                source: self.source,
                seq: inner.seq,
                kind,
                state: inner.state.clone(),
            };
            (event, out)
        };
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for listener in listeners {
            listener(&event);
        }
        out
    }

    fn set_status(&self, status: AdapterStatus) {
        self.update(AdapterEventKind::StatusChanged, |s| {
            let changed = s.status != status;
            s.status = status;
            (changed, ())
        })
    }

    /// Claim the initialization slot. False when a run is in flight, a retry
    /// is pending, or the adapter is already ready.
    fn begin_initialize(&self) -> bool {
        self.update(AdapterEventKind::StatusChanged, |s| match s.status {
            AdapterStatus::Initializing | AdapterStatus::RateLimited | AdapterStatus::Ready => {
                (false, false)
            }
            AdapterStatus::Error => {
                s.retry_count = 0;
                s.last_error = None;
                s.status = AdapterStatus::Initializing;
                (true, true)
            }
            AdapterStatus::Uninitialized => {
                s.status = AdapterStatus::Initializing;
                (true, true)
            }
        })
    }

    /// Drive the handshake through the lifecycle state machine.
    ///
    /// Returns `None` without touching the SDK when initialization is already
    /// in flight or done; otherwise the status the run ended in.
    pub async fn run_initialize<F, Fut>(&self, mut handshake: F) -> Option<AdapterStatus>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = WalletResult<()>> + Send,
    {
        if !self.begin_initialize() {
            tracing::debug!("{}: initialize skipped ({})", self.source, self.status().as_str());
            return None;
        }
        loop {
            let budget = self.policy.init_timeout;
            let attempt = clock::timeout(self.clock.as_ref(), budget, handshake());
            let outcome = match attempt.await {
                Ok(result) => result,
                Err(limit) => Err(WalletError::Timeout(limit)),
            };
            let err = match outcome {
                Ok(()) => {
                    self.update(AdapterEventKind::StatusChanged, |s| {
                        s.status = AdapterStatus::Ready;
                        s.last_error = None;
                        (true, ())
                    });
                    return Some(AdapterStatus::Ready);
                }
                Err(err) => err,
            };
            match self.record_failure(&err) {
                Failure::Backoff(delay) => {
                    self.clock.sleep(delay).await;
                    self.set_status(AdapterStatus::Initializing);
                }
                Failure::Stop => return Some(AdapterStatus::Error),
            }
        }
    }

    fn record_failure(&self, err: &WalletError) -> Failure {
        let policy = self.policy;
        let source = self.source;
        self.update(AdapterEventKind::StatusChanged, |s| {
            s.last_error = Some(err.to_string());
            if err.is_rate_limit() && s.retry_count < policy.max_retries {
                let delay = policy.delay_for(s.retry_count);
                s.retry_count += 1;
                s.status = AdapterStatus::RateLimited;
                tracing::warn!(
                    "{}: rate limited ({}), retry {}/{} in {:?}",
                    source, err, s.retry_count, policy.max_retries, delay
                );
                (true, Failure::Backoff(delay))
            } else {
                s.status = AdapterStatus::Error;
                if err.is_rate_limit() {
                    tracing::error!(
                        "{}: giving up after {} retries: {}",
                        source,
                        s.retry_count,
                        err
                    );
                } else {
                    tracing::error!("{}: initialization failed: {}", source, err);
                }
                (true, Failure::Stop)
            }
        })
    }

    pub fn require_ready(&self) -> WalletResult<()> {
        match self.status() {
            AdapterStatus::Ready => Ok(()),
            status => Err(WalletError::NotReady {
                adapter: self.source,
                rate_limited: status == AdapterStatus::RateLimited,
            }),
        }
    }

    pub fn mark_connected(&self, public_key: String) {
        self.update(AdapterEventKind::Connected, |s| {
            let changed = !s.connected || s.public_key.as_deref() != Some(public_key.as_str());
            s.connected = true;
            s.public_key = Some(public_key);
            (changed, ())
        })
    }

    /// Connection lost; the SDK is still ready.
    pub fn mark_disconnected(&self) {
        self.update(AdapterEventKind::Disconnected, |s| {
            let changed = s.connected || s.public_key.is_some();
            s.connected = false;
            s.public_key = None;
            (changed, ())
        })
    }

    /// Explicit logout: the one way out of `ready`.
    pub fn mark_logged_out(&self) {
        self.update(AdapterEventKind::LoggedOut, |s| {
            *s = AdapterState::default();
            (true, ())
        })
    }
}
