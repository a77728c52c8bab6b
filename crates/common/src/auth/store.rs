//! Credential store: the single source of truth for the current token set
//!
//! The store keeps the current [`TokenSet`] in memory and mirrors it to a
//! [`CredentialBackend`]. Mutations are serialized so the in-memory value
//! and the persisted record always move together, and every successful
//! change is announced to subscribers after it is visible through
//! [`CredentialStore::get`].

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::backend::{CredentialBackend, MemoryBackend};
use super::types::{SessionEvent, TokenSet};
use crate::error::CredentialError;

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Result of [`CredentialStore::compare_and_set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The expected session was current and has been replaced
    Updated,
    /// The session was cleared in the meantime; nothing was stored
    Missing,
    /// A different session is current; it is returned untouched
    Mismatch(TokenSet),
}

/// Handle returned by [`CredentialStore::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    /// Remove the listener. Returns `false` if it was already removed or the
    /// store is gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        registry.listeners.len() != before
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Current session credentials backed by durable storage.
pub struct CredentialStore {
    backend: Arc<dyn CredentialBackend>,
    current: RwLock<Option<TokenSet>>,
    write_lock: tokio::sync::Mutex<()>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl CredentialStore {
    /// Open the store and load any persisted session.
    ///
    /// # Errors
    /// Returns an error if the persisted record exists but cannot be read.
    #[instrument(skip(backend))]
    pub async fn open(backend: Arc<dyn CredentialBackend>) -> Result<Self, CredentialError> {
        let current = backend.load().await?;
        info!(authenticated = current.is_some(), "credential store opened");
        Ok(Self::from_parts(backend, current))
    }

    /// Store backed only by process memory, starting logged out.
    pub fn in_memory() -> Self {
        Self::from_parts(Arc::new(MemoryBackend::new()), None)
    }

    fn from_parts(backend: Arc<dyn CredentialBackend>, current: Option<TokenSet>) -> Self {
        Self {
            backend,
            current: RwLock::new(current),
            write_lock: tokio::sync::Mutex::new(()),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// Current token set, `None` when logged out.
    pub fn get(&self) -> Option<TokenSet> {
        self.current.read().clone()
    }

    /// Current access token, if signed in.
    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|tokens| tokens.access_token().to_string())
    }

    /// Whether a session is held.
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the session.
    ///
    /// The record is persisted first; memory and subscribers only see the
    /// new value once the backend accepted it.
    ///
    /// # Errors
    /// Returns an error if the token set is invalid or could not be
    /// persisted. The previous session stays current in that case.
    #[instrument(skip_all)]
    pub async fn set(&self, tokens: TokenSet) -> Result<(), CredentialError> {
        tokens.validate()?;

        let _guard = self.write_lock.lock().await;
        self.store_locked(tokens).await
    }

    /// Replace the session only if the current refresh token is
    /// `expected_refresh_token`.
    ///
    /// Used by refresh so a result computed for a session that was replaced
    /// or cleared in the meantime is discarded instead of resurrecting it.
    ///
    /// # Errors
    /// Returns an error if the token set is invalid or could not be
    /// persisted.
    #[instrument(skip_all)]
    pub async fn compare_and_set(
        &self,
        expected_refresh_token: &str,
        tokens: TokenSet,
    ) -> Result<SwapOutcome, CredentialError> {
        tokens.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.current.read().clone();
        match current {
            None => {
                debug!("session cleared during refresh, discarding result");
                Ok(SwapOutcome::Missing)
            }
            Some(current) if current.refresh_token() != Some(expected_refresh_token) => {
                debug!("session replaced during refresh, discarding result");
                Ok(SwapOutcome::Mismatch(current))
            }
            Some(_) => {
                self.store_locked(tokens).await?;
                Ok(SwapOutcome::Updated)
            }
        }
    }

    async fn store_locked(&self, tokens: TokenSet) -> Result<(), CredentialError> {
        self.backend.save(&tokens).await?;
        *self.current.write() = Some(tokens.clone());
        debug!(expires_at = %tokens.expires_at(), "session updated");
        self.notify(&SessionEvent::Updated(tokens));
        Ok(())
    }

    /// Log out. Returns `false` if there was no session to clear.
    ///
    /// The in-memory session is cleared even when the backend fails to
    /// delete the record, so a broken backend cannot keep a session alive.
    ///
    /// # Errors
    /// Returns the backend error after the session has been cleared.
    #[instrument(skip_all)]
    pub async fn clear(&self) -> Result<bool, CredentialError> {
        let _guard = self.write_lock.lock().await;

        if self.current.read().is_none() {
            return Ok(false);
        }
        self.clear_locked().await.map(|()| true)
    }

    /// Log out only if `expected` is still the current session.
    ///
    /// Returns `false` when the session was already cleared or replaced.
    ///
    /// # Errors
    /// Returns the backend error after the session has been cleared.
    #[instrument(skip_all)]
    pub async fn clear_if_current(&self, expected: &TokenSet) -> Result<bool, CredentialError> {
        let _guard = self.write_lock.lock().await;

        if self.current.read().as_ref() != Some(expected) {
            return Ok(false);
        }
        self.clear_locked().await.map(|()| true)
    }

    async fn clear_locked(&self) -> Result<(), CredentialError> {
        let deleted = self.backend.delete().await;
        *self.current.write() = None;
        if let Err(err) = &deleted {
            warn!(error = %err, "failed to delete persisted session");
        }
        info!("session cleared");
        self.notify(&SessionEvent::Cleared);
        deleted
    }

    /// Register a listener for session changes.
    ///
    /// Listeners run synchronously on the task that changed the session and
    /// must not block.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.listeners.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        Subscription { id, registry: Arc::downgrade(&self.listeners) }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().listeners.len()
    }

    fn notify(&self, event: &SessionEvent) {
        // Snapshot so listeners may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<Listener> =
            self.listeners.lock().listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
