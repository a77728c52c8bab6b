//! reqwest-backed transport

pub mod client;

pub use client::{ReqwestTransport, ReqwestTransportBuilder};
