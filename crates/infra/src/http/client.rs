use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;
use routelink_common::http::{HttpRequest, HttpResponse, HttpTransport, Method, TransportFailure};
use tracing::debug;

use crate::errors::{InfraError, IntoTransportFailure};

/// [`HttpTransport`] over a shared reqwest connection pool.
///
/// Performs exactly one attempt per call; retry, timeout classification
/// and authorization are handled above this layer.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, InfraError> {
        Self::builder().build()
    }

    fn convert(&self, request: HttpRequest) -> Result<reqwest::Request, TransportFailure> {
        let mut builder = self.client.request(to_reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder.build().map_err(IntoTransportFailure::into_transport_failure)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let method = request.method;
        let request = self.convert(request)?;
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(IntoTransportFailure::into_transport_failure)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(IntoTransportFailure::into_transport_failure)?;

        debug!(%method, %url, status, "received HTTP response");
        Ok(HttpResponse::new(status, body))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Option<Duration>,
    connect_timeout: Duration,
    user_agent: Option<String>,
    default_headers: Vec<(String, String)>,
    accept_invalid_certs: bool,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
            default_headers: Vec::new(),
            accept_invalid_certs: false,
        }
    }
}

impl ReqwestTransportBuilder {
    /// Hard deadline enforced by reqwest itself.
    ///
    /// The client applies its own per-attempt timeout, so this is a backstop
    /// and is unset by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// TCP connect deadline.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `User-Agent` header value.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Test-only helper to allow insecure TLS (e.g., self-signed certs).
    #[cfg(test)]
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, InfraError> {
        let mut builder =
            ReqwestClient::builder().connect_timeout(self.connect_timeout).no_proxy();

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if !self.default_headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in &self.default_headers {
                let name = HeaderName::try_from(name.as_str())
                    .map_err(|e| InfraError::HttpClient(format!("invalid header {name}: {e}")))?;
                let value = HeaderValue::try_from(value.as_str())
                    .map_err(|e| InfraError::HttpClient(format!("invalid header value: {e}")))?;
                headers.insert(name, value);
            }
            builder = builder.default_headers(headers);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(ReqwestTransport { client: builder.build()? })
    }
}
