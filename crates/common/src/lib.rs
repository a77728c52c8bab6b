//! Transport-agnostic core of the RouteLink API client.
//!
//! # Modules
//!
//! - [`auth`]: credential store, backends, refresh coordination
//! - [`cache`]: TTL response cache with request deduplication
//! - [`http`]: transport seam and the [`AuthenticatedClient`]
//! - [`config`]: [`ClientConfig`] and its defaults
//! - [`error`]: error taxonomy shared by every layer
//! - [`testing`]: scripted doubles and fixtures
//!
//! # Feature Flags
//!
//! - `platform`: OS keychain credential backend

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod time;
pub mod utils;

// Testing utilities
// ---------------------------------------------------------------
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use auth::{
    CredentialBackend, CredentialStore, RefreshCoordinator, SessionContext, SessionEvent, TokenSet,
};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ConfigError, CredentialError, ErrorCategory};
pub use http::{AuthenticatedClient, HttpTransport, RequestSpec};
pub use utils::serde::duration_millis;
