//! Time abstractions
//!
//! Expiry decisions read time through [`Clock`] so tests can move time
//! forward with [`MockClock`] instead of sleeping.

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
