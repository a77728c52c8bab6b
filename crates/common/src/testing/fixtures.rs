//! Token fixtures
//!
//! Build [`TokenSet`]s relative to a clock so expiry scenarios stay
//! deterministic under [`MockClock`](crate::time::MockClock).

#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

use crate::auth::TokenSet;
use crate::time::Clock;

/// Token set issued now and expiring after `lifetime`, with a refresh token.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use routelink_common::testing::{fixtures, MockClock};
///
/// let clock = MockClock::new();
/// let tokens = fixtures::session(&clock, "access-0", Duration::from_secs(240));
/// assert_eq!(tokens.refresh_token(), Some("refresh-0"));
/// ```
pub fn session(clock: &dyn Clock, access_token: &str, lifetime: Duration) -> TokenSet {
    build(clock, access_token, Some("refresh-0"), lifetime)
}

/// Token set without a refresh token; it cannot be renewed.
pub fn session_without_refresh(
    clock: &dyn Clock,
    access_token: &str,
    lifetime: Duration,
) -> TokenSet {
    build(clock, access_token, None, lifetime)
}

fn build(
    clock: &dyn Clock,
    access_token: &str,
    refresh_token: Option<&str>,
    lifetime: Duration,
) -> TokenSet {
    let seconds = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
    match TokenSet::issued(access_token, refresh_token.map(str::to_string), clock.utc_now(), seconds)
    {
        Ok(tokens) => tokens,
        Err(err) => panic!("invalid fixture token set: {err}"),
    }
}
