//! Durable storage backends for the credential record
//!
//! A backend persists exactly one canonical [`TokenSet`] record. Absence of
//! the record means "logged out". Backends do no retrying; a failed write is
//! reported to the [`CredentialStore`](super::CredentialStore), which decides
//! what it means for the session.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::types::TokenSet;
use crate::error::CredentialError;

/// Persistence for the single current token set.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Load the persisted record, `None` when logged out.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be read or parsed.
    async fn load(&self) -> Result<Option<TokenSet>, CredentialError>;

    /// Replace the persisted record.
    ///
    /// # Errors
    /// Returns an error if the record could not be written.
    async fn save(&self, tokens: &TokenSet) -> Result<(), CredentialError>;

    /// Remove the persisted record. Removing a missing record succeeds.
    ///
    /// # Errors
    /// Returns an error if an existing record could not be removed.
    async fn delete(&self) -> Result<(), CredentialError>;
}

/// Process-local backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    record: Mutex<Option<TokenSet>>,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryBackend {
    /// Empty backend: nothing persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that starts with a persisted record.
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self { record: Mutex::new(Some(tokens)), ..Self::default() }
    }

    /// Current persisted record.
    pub fn record(&self) -> Option<TokenSet> {
        self.record.lock().clone()
    }

    /// Number of `save` calls.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<TokenSet>, CredentialError> {
        Ok(self.record.lock().clone())
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), CredentialError> {
        *self.record.lock() = Some(tokens.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> Result<(), CredentialError> {
        *self.record.lock() = None;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
