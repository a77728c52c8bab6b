//! Platform keychain credential backend (feature `platform`)
//!
//! The whole token set is stored as one JSON secret under a single
//! service/account entry:
//!
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service
//!
//! Keychain calls are blocking and short; they run on the blocking pool.

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::backend::CredentialBackend;
use super::types::TokenSet;
use crate::error::CredentialError;

/// Stores the token set in the OS keychain.
#[derive(Debug, Clone)]
pub struct KeychainBackend {
    service: String,
    account: String,
}

impl KeychainBackend {
    /// # Examples
    /// ```no_run
    /// use routelink_common::auth::KeychainBackend;
    ///
    /// let backend = KeychainBackend::new("RouteLink.api", "session");
    /// ```
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    fn entry(service: &str, account: &str) -> Result<Entry, CredentialError> {
        Entry::new(service, account).map_err(|e| CredentialError::Keychain(e.to_string()))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, CredentialError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, CredentialError> + Send + 'static,
    {
        let service = self.service.clone();
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || op(Self::entry(&service, &account)?))
            .await
            .map_err(|e| CredentialError::Keychain(format!("keychain task failed: {e}")))?
    }
}

#[async_trait]
impl CredentialBackend for KeychainBackend {
    async fn load(&self) -> Result<Option<TokenSet>, CredentialError> {
        debug!(service = %self.service, account = %self.account, "reading credential record");

        let secret = self
            .run_blocking(|entry| match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(CredentialError::Keychain(e.to_string())),
            })
            .await?;

        let Some(secret) = secret else {
            return Ok(None);
        };

        let tokens: TokenSet = serde_json::from_str(&secret)?;
        tokens.validate()?;
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), CredentialError> {
        debug!(service = %self.service, account = %self.account, "writing credential record");

        let secret = serde_json::to_string(tokens)?;
        self.run_blocking(move |entry| {
            entry.set_password(&secret).map_err(|e| CredentialError::Keychain(e.to_string()))
        })
        .await
    }

    async fn delete(&self) -> Result<(), CredentialError> {
        debug!(service = %self.service, account = %self.account, "deleting credential record");

        self.run_blocking(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Keychain(e.to_string())),
        })
        .await
    }
}
