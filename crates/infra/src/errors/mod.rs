//! Infrastructure error type
//!
//! Everything that can go wrong while assembling a client from the outside
//! world: configuration, credential storage, and the HTTP stack itself.

mod conversions;

pub(crate) use conversions::IntoTransportFailure;
use routelink_common::{ClientError, ConfigError, CredentialError};
use thiserror::Error;

/// Failure while loading configuration or wiring a client.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The reqwest client could not be constructed (TLS backend, headers)
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Result alias for infrastructure operations.
pub type InfraResult<T> = Result<T, InfraError>;
