//! Refresh-token exchange
//!
//! [`TokenRefresher`] is the seam the [`RefreshCoordinator`](super::RefreshCoordinator)
//! calls once per network attempt. Retrying and persistence stay with the
//! coordinator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use super::types::TokenResponse;
use crate::error::ClientError;
use crate::http::{HttpRequest, Method, Transport};

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform one exchange.
    ///
    /// # Errors
    /// Returns a retryable [`ClientError`] for transient failures and a
    /// terminal one when the refresh token was rejected.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refreshes against the API's refresh endpoint.
///
/// Sends `POST {"refresh_token": ...}` without an `Authorization` header and
/// expects `{"access_token", "refresh_token"?, "expires_in"}` back.
#[derive(Clone)]
pub struct EndpointRefresher {
    transport: Transport,
    url: String,
    timeout: Duration,
}

impl EndpointRefresher {
    /// Refresher posting to `url` with a per-attempt `timeout`.
    pub fn new(transport: Transport, url: impl Into<String>, timeout: Duration) -> Self {
        Self { transport, url: url.into(), timeout }
    }

    /// Refresh endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for EndpointRefresher {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        if refresh_token.is_empty() {
            return Err(ClientError::Unauthenticated);
        }

        let body = serde_json::to_string(&RefreshRequest { refresh_token })
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let request = HttpRequest::new(Method::Post, self.url.clone())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body);

        let response = self.transport.attempt(request, self.timeout).await.into_result()?;
        let tokens: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| ClientError::Decode(format!("refresh response: {e}")))?;

        debug!(
            expires_in = tokens.expires_in,
            rotated = tokens.refresh_token.is_some(),
            "refresh exchange completed"
        );
        Ok(tokens)
    }
}
