//! Token and session types
//!
//! A [`TokenSet`] is replaced as a whole: access and refresh tokens always
//! change together, and the expiry invariant `expires_at > issued_at` is
//! checked on every construction path, including deserialization by the
//! credential backends.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// The current session's credentials.
///
/// This is also the persisted record layout: one canonical JSON object with
/// camelCase keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Build a token set from explicit timestamps.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidTokenSet`] if the access token is
    /// empty or `expires_at <= issued_at`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, CredentialError> {
        let tokens =
            Self { access_token: access_token.into(), refresh_token, issued_at, expires_at };
        tokens.validate()?;
        Ok(tokens)
    }

    /// Build a token set issued at `issued_at` and valid for `expires_in`
    /// seconds.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidTokenSet`] for a non-positive
    /// lifetime or an empty access token.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_in: i64,
    ) -> Result<Self, CredentialError> {
        let expires_at = chrono::Duration::try_seconds(expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                CredentialError::InvalidTokenSet(format!("lifetime {expires_in}s out of range"))
            })?;
        Self::new(access_token, refresh_token, issued_at, expires_at)
    }

    /// Build the replacement set from a refresh response.
    ///
    /// Servers that do not rotate refresh tokens omit them; the previous one
    /// is carried over in that case.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidTokenSet`] if the response does not
    /// describe a valid token set.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, CredentialError> {
        let refresh_token = response.refresh_token.or(previous_refresh_token);
        Self::issued(response.access_token, refresh_token, now, response.expires_in)
    }

    /// Check the construction invariants.
    ///
    /// # Errors
    /// Returns [`CredentialError::InvalidTokenSet`] describing the violation.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.access_token.is_empty() {
            return Err(CredentialError::InvalidTokenSet("access token is empty".into()));
        }
        if self.expires_at <= self.issued_at {
            return Err(CredentialError::InvalidTokenSet(format!(
                "expires_at {} is not after issued_at {}",
                self.expires_at, self.issued_at
            )));
        }
        Ok(())
    }

    /// Bearer token sent with requests.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Refresh token, if the server issued one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Whether a refresh is possible at all.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// When the token set was issued.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the access token stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Time left before expiry; negative once expired.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }

    /// Whether the access token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether less than `window` remains before expiry.
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => self.time_remaining(now) < window,
            Err(_) => true,
        }
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Token values never reach logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: String,
    /// Rotated refresh token, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl TokenResponse {
    /// Response issued `expires_in` seconds before expiry.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self { access_token: access_token.into(), refresh_token, expires_in }
    }
}

/// Change delivered to session listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A token set was stored (login or refresh)
    Updated(TokenSet),
    /// The session was cleared (logout, failed refresh, or expiry)
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn rejects_expiry_not_after_issue() {
        let issued = now();
        assert!(TokenSet::new("a", None, issued, issued).is_err());
        assert!(TokenSet::issued("a", None, issued, 0).is_err());
        assert!(TokenSet::issued("a", None, issued, -60).is_err());
    }

    #[test]
    fn rejects_out_of_range_lifetime() {
        let response = TokenResponse::new("x", None, i64::MAX);
        let result = TokenSet::from_response(response, Some("r".into()), now());
        assert!(matches!(result, Err(CredentialError::InvalidTokenSet(_))));

        assert!(TokenSet::issued("x", None, now(), i64::MAX / 1000).is_err());
    }

    #[test]
    fn rejects_empty_access_token() {
        assert!(TokenSet::issued("", Some("r".into()), now(), 60).is_err());
    }

    #[test]
    fn expiry_window_checks() {
        let issued = now();
        let tokens = TokenSet::issued("a", Some("r".into()), issued, 240).expect("tokens");

        assert!(tokens.expires_within(Duration::from_secs(300), issued));
        assert!(!tokens.expires_within(Duration::from_secs(60), issued));
        assert!(!tokens.is_expired_at(issued));
        assert!(tokens.is_expired_at(tokens.expires_at()));
    }

    #[test]
    fn response_without_refresh_token_keeps_previous() {
        let response = TokenResponse::new("new-access", None, 3600);
        let tokens =
            TokenSet::from_response(response, Some("old-refresh".into()), now()).expect("tokens");

        assert_eq!(tokens.access_token(), "new-access");
        assert_eq!(tokens.refresh_token(), Some("old-refresh"));
    }

    #[test]
    fn rotated_refresh_token_wins() {
        let response = TokenResponse::new("new-access", Some("new-refresh".into()), 3600);
        let tokens =
            TokenSet::from_response(response, Some("old-refresh".into()), now()).expect("tokens");

        assert_eq!(tokens.refresh_token(), Some("new-refresh"));
    }

    #[test]
    fn persisted_layout_uses_camel_case() {
        let tokens = TokenSet::issued("a", Some("r".into()), now(), 60).expect("tokens");
        let json = serde_json::to_value(&tokens).expect("serialize");

        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("issuedAt").is_some());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let tokens = TokenSet::issued("secret-access", Some("secret-refresh".into()), now(), 60)
            .expect("tokens");
        let rendered = format!("{tokens:?}");

        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
