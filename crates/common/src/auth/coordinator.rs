//! Single-flight token refresh and proactive expiry monitoring
//!
//! # State machine
//!
//! ```text
//!   Idle ──ensure_fresh──► Refreshing ──ok──► Idle
//!                              │
//!                              └──err──► Failed ──(store cleared)──► Idle
//! ```
//!
//! At most one refresh operation exists at a time. Callers arriving while
//! one is in flight join it and receive its result; they never start their
//! own network call. The operation runs on its own task, so it completes
//! (and persists its result) even if every waiter goes away.
//!
//! A failed refresh is terminal for the session: the store is cleared once
//! and every waiter receives [`ClientError::Unauthenticated`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::refresher::TokenRefresher;
use super::store::{CredentialStore, Subscription, SwapOutcome};
use super::types::{SessionEvent, TokenSet};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::time::{Clock, SystemClock};

type RefreshOperation = Shared<BoxFuture<'static, Result<TokenSet, ClientError>>>;

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in flight
    Idle,
    /// A refresh is in flight; callers join it
    Refreshing,
    /// The last refresh failed and the session is being cleared
    Failed,
}

enum Phase {
    Idle,
    Refreshing { generation: u64, operation: RefreshOperation },
    Failed,
}

impl Phase {
    fn state(&self) -> RefreshState {
        match self {
            Self::Idle => RefreshState::Idle,
            Self::Refreshing { .. } => RefreshState::Refreshing,
            Self::Failed => RefreshState::Failed,
        }
    }
}

/// Tuning for refresh retries and the expiry monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Retries after the first refresh attempt, for retryable failures only
    pub max_retries: u32,
    /// Linear backoff step between refresh attempts
    pub base_delay: Duration,
    /// Refresh proactively once less than this remains before expiry
    pub proactive_window: Duration,
    /// Period of the background monitor
    pub monitor_interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for RefreshSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.refresh_attempts,
            base_delay: config.refresh_base_delay,
            proactive_window: config.proactive_window,
            monitor_interval: config.monitor_interval,
        }
    }
}

/// What a single [`RefreshCoordinator::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nobody is logged in
    NoSession,
    /// The token is outside the proactive window
    Fresh,
    /// A refresh was already running; nothing new was started
    InFlight,
    /// A proactive refresh ran and succeeded
    Refreshed,
    /// A proactive refresh ran and failed; the session was cleared
    RefreshFailed(ClientError),
    /// The token expired and could not be refreshed; the session was cleared
    SessionExpired,
    /// The current expiry was already handled
    ExpiryAlreadyHandled,
}

#[derive(Debug, Default)]
struct SessionFlags {
    expiry_handled: AtomicBool,
    refresh_failed: AtomicBool,
}

struct Inner {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    settings: RefreshSettings,
    clock: Arc<dyn Clock>,
    phase: Mutex<Phase>,
    generation: AtomicU64,
    refresh_calls: AtomicUsize,
    flags: Arc<SessionFlags>,
    subscription: Mutex<Option<Subscription>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            let _ = subscription.unsubscribe();
        }
    }
}

/// Owns the refresh protocol for one [`CredentialStore`].
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Coordinator on the system clock.
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        settings: RefreshSettings,
    ) -> Self {
        Self::with_clock(store, refresher, settings, Arc::new(SystemClock))
    }

    /// Coordinator on an explicit clock.
    pub fn with_clock(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        settings: RefreshSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let flags = Arc::new(SessionFlags::default());

        // A new token set starts a new expiry cycle.
        let listener_flags = Arc::clone(&flags);
        let subscription = store.subscribe(move |event| {
            if let SessionEvent::Updated(_) = event {
                listener_flags.expiry_handled.store(false, Ordering::SeqCst);
                listener_flags.refresh_failed.store(false, Ordering::SeqCst);
            }
        });

        Self {
            inner: Arc::new(Inner {
                store,
                refresher,
                settings,
                clock,
                phase: Mutex::new(Phase::Idle),
                generation: AtomicU64::new(0),
                refresh_calls: AtomicUsize::new(0),
                flags,
                subscription: Mutex::new(Some(subscription)),
            }),
        }
    }

    /// Current phase.
    pub fn state(&self) -> RefreshState {
        self.inner.phase.lock().state()
    }

    /// Number of refresh network calls issued so far, retries included.
    pub fn refresh_count(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    /// Store the coordinator refreshes into.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    /// Retry and window settings in effect.
    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    /// Obtain a freshly refreshed token set.
    ///
    /// Joins the in-flight refresh if there is one, otherwise starts it.
    ///
    /// # Errors
    /// Returns [`ClientError::Unauthenticated`] when the refresh failed and
    /// the session was cleared, or while a failure is being processed.
    pub async fn ensure_fresh(&self) -> Result<TokenSet, ClientError> {
        let operation = {
            let mut phase = self.inner.phase.lock();
            let joined = match &*phase {
                Phase::Refreshing { operation, .. } => Some(operation.clone()),
                Phase::Failed => return Err(ClientError::Unauthenticated),
                Phase::Idle => None,
            };
            match joined {
                Some(operation) => {
                    trace!("joining in-flight refresh");
                    operation
                }
                None => self.start_locked(&mut phase),
            }
        };

        operation.await
    }

    fn start_locked(&self, phase: &mut Phase) -> RefreshOperation {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let snapshot = inner.store.get();
        let task = tokio::spawn(run_refresh(Arc::clone(&inner), generation, snapshot.clone()));

        let operation = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "refresh task did not complete");
                    fail(&inner, generation, snapshot.as_ref()).await
                }
            }
        }
        .boxed()
        .shared();

        debug!(generation, "refresh started");
        *phase = Phase::Refreshing { generation, operation: operation.clone() };
        operation
    }

    /// One pass of the expiry monitor.
    ///
    /// Starts at most one proactive refresh, and clears an expired session
    /// that cannot be refreshed exactly once per expiry.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickOutcome {
        let Some(tokens) = self.inner.store.get() else {
            return TickOutcome::NoSession;
        };
        let now = self.inner.clock.utc_now();
        let flags = &self.inner.flags;

        if tokens.is_expired_at(now)
            && (!tokens.has_refresh_token() || flags.refresh_failed.load(Ordering::SeqCst))
        {
            if flags.expiry_handled.swap(true, Ordering::SeqCst) {
                return TickOutcome::ExpiryAlreadyHandled;
            }
            info!(
                expired_at = %tokens.expires_at(),
                "session expired without a usable refresh token"
            );
            if let Err(err) = self.inner.store.clear_if_current(&tokens).await {
                warn!(error = %err, "failed to remove expired session");
            }
            return TickOutcome::SessionExpired;
        }

        if !tokens.expires_within(self.inner.settings.proactive_window, now) {
            return TickOutcome::Fresh;
        }

        let operation = {
            let mut phase = self.inner.phase.lock();
            if !matches!(*phase, Phase::Idle) {
                return TickOutcome::InFlight;
            }
            self.start_locked(&mut phase)
        };

        debug!(remaining = %tokens.time_remaining(now), "proactive refresh");
        match operation.await {
            Ok(_) => TickOutcome::Refreshed,
            Err(err) => TickOutcome::RefreshFailed(err),
        }
    }

    /// Run [`tick`](Self::tick) every `monitor_interval` until the returned
    /// handle is shut down or dropped.
    pub fn spawn_monitor(&self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let coordinator = self.clone();
        let period = self.inner.settings.monitor_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?period, "session monitor started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let outcome = coordinator.tick().await;
                        trace!(?outcome, "session monitor tick");
                    }
                }
            }

            debug!("session monitor stopped");
        });

        MonitorHandle { cancel, task: Some(task) }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("refresh_count", &self.refresh_count())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

async fn run_refresh(
    inner: Arc<Inner>,
    generation: u64,
    snapshot: Option<TokenSet>,
) -> Result<TokenSet, ClientError> {
    let result = match snapshot.as_ref().and_then(TokenSet::refresh_token) {
        Some(refresh_token) if !refresh_token.is_empty() => {
            AssertUnwindSafe(exchange(&inner, refresh_token))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!(generation, "token refresh panicked");
                    Err(ClientError::Aborted)
                })
        }
        _ => Err(ClientError::Unauthenticated),
    };

    match result {
        Ok(tokens) => {
            finish(&inner, generation, Phase::Idle);
            info!(generation, "token refresh succeeded");
            Ok(tokens)
        }
        Err(err) => {
            warn!(generation, error = %err, "token refresh failed, clearing session");
            fail(&inner, generation, snapshot.as_ref()).await
        }
    }
}

/// Failure path: mark the cycle failed, clear the session the refresh was
/// started for, return to Idle.
async fn fail(
    inner: &Inner,
    generation: u64,
    snapshot: Option<&TokenSet>,
) -> Result<TokenSet, ClientError> {
    finish(inner, generation, Phase::Failed);
    inner.flags.refresh_failed.store(true, Ordering::SeqCst);

    if let Some(tokens) = snapshot {
        if let Err(clear_err) = inner.store.clear_if_current(tokens).await {
            warn!(error = %clear_err, "failed to remove session after refresh failure");
        }
    }

    let mut phase = inner.phase.lock();
    if matches!(*phase, Phase::Failed) {
        *phase = Phase::Idle;
    }
    Err(ClientError::Unauthenticated)
}

fn finish(inner: &Inner, generation: u64, next: Phase) {
    let mut phase = inner.phase.lock();
    if matches!(&*phase, Phase::Refreshing { generation: g, .. } if *g == generation) {
        *phase = next;
    }
}

/// Exchange the refresh token with bounded retries and persist the result.
async fn exchange(inner: &Inner, refresh_token: &str) -> Result<TokenSet, ClientError> {
    let mut retry = 0u32;
    let response = loop {
        inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match inner.refresher.refresh(refresh_token).await {
            Ok(response) => break response,
            Err(err) if err.is_retryable() && retry < inner.settings.max_retries => {
                retry += 1;
                let delay = inner.settings.base_delay.saturating_mul(retry);
                debug!(retry, ?delay, error = %err, "retrying token refresh");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    };

    let tokens = TokenSet::from_response(
        response,
        Some(refresh_token.to_string()),
        inner.clock.utc_now(),
    )
    .map_err(|e| ClientError::Decode(e.to_string()))?;

    match inner.store.compare_and_set(refresh_token, tokens.clone()).await {
        Ok(SwapOutcome::Updated) => Ok(tokens),
        Ok(SwapOutcome::Mismatch(current)) => Ok(current),
        Ok(SwapOutcome::Missing) => Err(ClientError::Unauthenticated),
        Err(err) => {
            warn!(error = %err, "failed to persist refreshed session");
            Err(ClientError::Unauthenticated)
        }
    }
}

/// Handle to the background monitor started by
/// [`RefreshCoordinator::spawn_monitor`]. Dropping it stops the monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// `false` once the monitor task has exited.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the monitor and wait for its task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "session monitor task failed");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
