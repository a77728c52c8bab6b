//! Error taxonomy for the client core
//!
//! [`ClientError`] is both the transport's failure type and what callers of
//! [`AuthenticatedClient`](crate::http::AuthenticatedClient) receive. It is
//! `Clone` because a single failure is fanned out to every caller attached to
//! a shared in-flight request or refresh.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection failures and 5xx responses, retried with backoff
    Transient,
    /// The attempt ran out of time; the server may have processed it
    Timeout,
    /// 401 from the server, handled by refresh-then-retry-once
    Authorization,
    /// 4xx other than 401, surfaced verbatim
    Rejected,
    /// The session is gone
    Session,
    /// The attempt was cancelled
    Aborted,
    /// The request or response could not be (de)serialized or built
    Local,
}

/// Failure of a request issued through the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server responded with status {status}")]
    HttpStatus { status: u16, body: String },

    #[error("not authenticated")]
    Unauthenticated,

    #[error("request aborted")]
    Aborted,

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Config(String),
}

impl ClientError {
    /// Category used by the retry loop.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Transient,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::HttpStatus { status: 401, .. } => ErrorCategory::Authorization,
            Self::HttpStatus { status, .. } if *status >= 500 => ErrorCategory::Transient,
            Self::HttpStatus { .. } => ErrorCategory::Rejected,
            Self::Unauthenticated => ErrorCategory::Session,
            Self::Aborted => ErrorCategory::Aborted,
            Self::Decode(_) | Self::Config(_) => ErrorCategory::Local,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Whether this is a 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure of a credential backend.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential record is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("keychain access failed: {0}")]
    Keychain(String),

    #[error("invalid token set: {0}")]
    InvalidTokenSet(String),
}

/// Invalid or unloadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no config file found (searched {searched} locations)")]
    NotFound { searched: usize },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
