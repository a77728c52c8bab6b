//! Single-attempt transport with timeout and outcome classification
//!
//! [`Transport::attempt`] performs exactly one call through a pluggable
//! [`HttpTransport`] and reports whether the caller may retry. Retry loops
//! live with the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::types::{HttpRequest, HttpResponse, TransportFailure};
use crate::error::ClientError;

/// Performs one HTTP attempt. Implemented by the reqwest adapter in
/// `routelink-infra` and by test doubles.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and return the raw status and body.
    ///
    /// # Errors
    /// Returns a [`TransportFailure`] when no response was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx response
    Success(HttpResponse),
    /// Connection failure or 5xx; another attempt may succeed
    Retryable(ClientError),
    /// Timeout, cancellation, or a non-5xx error status (including 401)
    Terminal(ClientError),
}

impl Outcome {
    /// Collapse into a plain result, discarding the retry hint.
    ///
    /// # Errors
    /// Returns the carried [`ClientError`] for non-success outcomes.
    pub fn into_result(self) -> Result<HttpResponse, ClientError> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Retryable(err) | Self::Terminal(err) => Err(err),
        }
    }
}

/// Classify a received response by status code.
pub fn classify(response: HttpResponse) -> Outcome {
    match response.status {
        200..=299 => Outcome::Success(response),
        500..=599 => Outcome::Retryable(ClientError::HttpStatus {
            status: response.status,
            body: response.body,
        }),
        status => Outcome::Terminal(ClientError::HttpStatus { status, body: response.body }),
    }
}

/// Timeout-bounded wrapper around an [`HttpTransport`].
#[derive(Clone)]
pub struct Transport {
    inner: Arc<dyn HttpTransport>,
}

impl Transport {
    /// Wrap a raw transport.
    pub fn new(inner: Arc<dyn HttpTransport>) -> Self {
        Self { inner }
    }

    /// Perform exactly one attempt.
    ///
    /// When `timeout` elapses first the in-flight call is dropped, which
    /// cancels it and releases its resources.
    pub async fn attempt(&self, request: HttpRequest, timeout: Duration) -> Outcome {
        let method = request.method;
        let url = request.url.clone();

        let outcome = match tokio::time::timeout(timeout, self.inner.send(request)).await {
            Err(_) => Outcome::Terminal(ClientError::Timeout(timeout)),
            Ok(Ok(response)) => classify(response),
            Ok(Err(TransportFailure::Connection(message))) => {
                Outcome::Retryable(ClientError::Network(message))
            }
            Ok(Err(TransportFailure::TimedOut)) => Outcome::Terminal(ClientError::Timeout(timeout)),
            Ok(Err(TransportFailure::Cancelled)) => Outcome::Terminal(ClientError::Aborted),
        };

        match &outcome {
            Outcome::Success(response) => {
                debug!(%method, %url, status = response.status, "attempt succeeded");
            }
            Outcome::Retryable(err) | Outcome::Terminal(err) => {
                debug!(%method, %url, error = %err, "attempt failed");
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::ScriptedTransport;

    const URL: &str = "http://api.test/items";

    fn transport(script: &Arc<ScriptedTransport>) -> Transport {
        Transport::new(Arc::clone(script) as Arc<dyn HttpTransport>)
    }

    #[test]
    fn classifies_status_codes() {
        assert!(matches!(classify(HttpResponse::new(200, "{}")), Outcome::Success(_)));
        assert!(matches!(
            classify(HttpResponse::new(503, "")),
            Outcome::Retryable(ClientError::HttpStatus { status: 503, .. })
        ));
        assert!(matches!(
            classify(HttpResponse::new(401, "expired")),
            Outcome::Terminal(ClientError::HttpStatus { status: 401, .. })
        ));
        assert!(matches!(
            classify(HttpResponse::new(422, "bad")),
            Outcome::Terminal(ClientError::HttpStatus { status: 422, .. })
        ));
    }

    #[tokio::test]
    async fn connection_failure_is_retryable() {
        let script = Arc::new(ScriptedTransport::new());
        script.enqueue_failure(URL, TransportFailure::Connection("refused".into()));

        let outcome =
            transport(&script).attempt(HttpRequest::new(Method::Get, URL), Duration::from_secs(1)).await;

        assert_eq!(outcome, Outcome::Retryable(ClientError::Network("refused".into())));
    }

    #[tokio::test]
    async fn cancellation_is_terminal() {
        let script = Arc::new(ScriptedTransport::new());
        script.enqueue_failure(URL, TransportFailure::Cancelled);

        let outcome =
            transport(&script).attempt(HttpRequest::new(Method::Get, URL), Duration::from_secs(1)).await;

        assert_eq!(outcome, Outcome::Terminal(ClientError::Aborted));
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let script = Arc::new(ScriptedTransport::new());
        script.set_latency(Duration::from_millis(200));
        script.enqueue(URL, 200, "{}");

        let timeout = Duration::from_millis(20);
        let outcome = transport(&script).attempt(HttpRequest::new(Method::Get, URL), timeout).await;

        assert_eq!(outcome, Outcome::Terminal(ClientError::Timeout(timeout)));
    }
}
