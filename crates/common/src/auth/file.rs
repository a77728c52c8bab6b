//! JSON file credential backend
//!
//! The record is written to a sibling temporary file and renamed into place,
//! so a crash mid-write leaves either the old record or the new one, never a
//! torn mix.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::backend::CredentialBackend;
use super::types::TokenSet;
use crate::error::CredentialError;

/// Stores the token set as a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Backend persisting to the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the session record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialBackend for FileBackend {
    async fn load(&self) -> Result<Option<TokenSet>, CredentialError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let tokens: TokenSet = serde_json::from_str(&contents)?;
        tokens.validate()?;
        debug!(path = %self.path.display(), "loaded credential record");
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = self.staging_path();
        let json = serde_json::to_vec_pretty(tokens)?;
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        debug!(path = %self.path.display(), "persisted credential record");
        Ok(())
    }

    async fn delete(&self) -> Result<(), CredentialError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
