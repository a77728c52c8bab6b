//! Testing utilities and helpers
//!
//! - **[`mocks`]**: scripted [`HttpTransport`](crate::http::HttpTransport)
//!   and [`TokenRefresher`](crate::auth::TokenRefresher) doubles
//! - **[`fixtures`]**: token sets relative to a clock
//! - **[`async_utils`]**: polling helpers for background tasks
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use routelink_common::testing::MockClock;
//!
//! let clock = MockClock::new();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.elapsed(), Duration::from_secs(5));
//! ```

pub mod async_utils;
pub mod fixtures;
pub mod mocks;

pub use async_utils::poll_until;
pub use mocks::{MockRefresher, ScriptedTransport};

pub use crate::auth::MemoryBackend;
pub use crate::time::MockClock;
