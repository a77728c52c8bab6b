//! Session credentials and token refresh
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SessionContext  │  Handed to AuthenticatedClient
//! └────────┬─────────┘
//!          │
//!          ├──► CredentialStore     (current TokenSet + listeners)
//!          │         │
//!          │         └──► CredentialBackend  (memory, file, keychain)
//!          │
//!          └──► RefreshCoordinator  (single-flight refresh + expiry monitor)
//!                    │
//!                    └──► TokenRefresher     (refresh endpoint exchange)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use routelink_common::auth::{
//!     CredentialStore, FileBackend, RefreshCoordinator, RefreshSettings,
//! };
//! use routelink_common::testing::MockRefresher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(FileBackend::new("session.json"));
//!     let store = Arc::new(CredentialStore::open(backend).await?);
//!     let refresher = Arc::new(MockRefresher::new());
//!     let coordinator = RefreshCoordinator::new(store, refresher, RefreshSettings::default());
//!
//!     // Refresh proactively before the token expires
//!     let monitor = coordinator.spawn_monitor();
//!
//!     // ... issue requests ...
//!
//!     monitor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod coordinator;
pub mod file;
#[cfg(feature = "platform")]
pub mod keychain;
pub mod refresher;
pub mod session;
pub mod store;
pub mod types;

pub use backend::{CredentialBackend, MemoryBackend};
pub use coordinator::{
    MonitorHandle, RefreshCoordinator, RefreshSettings, RefreshState, TickOutcome,
};
pub use file::FileBackend;
#[cfg(feature = "platform")]
pub use keychain::KeychainBackend;
pub use refresher::{EndpointRefresher, TokenRefresher};
pub use session::SessionContext;
pub use store::{CredentialStore, Subscription, SwapOutcome};
pub use types::{SessionEvent, TokenResponse, TokenSet};
