//! HTTP request pipeline
//!
//! - **[`types`]**: wire-level request and response values
//! - **[`transport`]**: one timeout-bounded attempt through a pluggable
//!   [`HttpTransport`]
//! - **[`client`]**: the authenticated, retrying, caching [`AuthenticatedClient`]

pub mod client;
pub mod transport;
pub mod types;

pub use client::{AuthenticatedClient, RequestSpec};
pub use transport::{classify, HttpTransport, Outcome, Transport};
pub use types::{HttpRequest, HttpResponse, Method, TransportFailure};
