//! # Routelink Infrastructure
//!
//! Concrete adapters for the `routelink-common` client core.
//!
//! This crate contains:
//! - A reqwest implementation of the transport boundary
//! - Configuration loading from environment variables and files
//! - [`connect`], which wires transport, credential store, refresh
//!   coordinator and client together
//!
//! ## Architecture
//! - Implements traits defined in `routelink-common`
//! - Contains all "impure" code (network and file I/O)

#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod http;
pub mod wiring;

// Re-export commonly used items
pub use errors::{InfraError, InfraResult};
pub use http::{ReqwestTransport, ReqwestTransportBuilder};
pub use wiring::{connect, connect_with_transport};
