//! Explicit session context
//!
//! One [`SessionContext`] represents "the current session": a credential
//! store plus the coordinator that refreshes it. It is built once and handed
//! to every client that should share the session.

use std::sync::Arc;

use super::coordinator::{RefreshCoordinator, RefreshSettings};
use super::refresher::TokenRefresher;
use super::store::CredentialStore;
use crate::time::{Clock, SystemClock};

/// Credential store and refresh coordinator sharing one clock.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    clock: Arc<dyn Clock>,
}

impl SessionContext {
    /// Session on the system clock.
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        settings: RefreshSettings,
    ) -> Self {
        Self::with_clock(store, refresher, settings, Arc::new(SystemClock))
    }

    /// Session with an explicit clock, shared by the coordinator.
    pub fn with_clock(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        settings: RefreshSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let coordinator = RefreshCoordinator::with_clock(
            Arc::clone(&store),
            refresher,
            settings,
            Arc::clone(&clock),
        );
        Self { store, coordinator, clock }
    }

    /// Credential store.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Refresh coordinator.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Clock used for expiry checks.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
