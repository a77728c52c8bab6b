//! Authenticated API client
//!
//! [`AuthenticatedClient`] is the single entry point for API calls. Per
//! request it:
//!
//! 1. serves GETs from the response cache, or attaches to an identical GET
//!    already in flight
//! 2. attaches the current access token and performs one transport attempt
//! 3. retries transient failures (`Network`, 5xx) with linear backoff
//! 4. on 401, refreshes through the
//!    [`RefreshCoordinator`](crate::auth::RefreshCoordinator) and replays the
//!    request exactly once with the new token
//! 5. caches successful GET results for the call's TTL
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use routelink_common::auth::{
//!     CredentialStore, EndpointRefresher, RefreshSettings, SessionContext,
//! };
//! use routelink_common::http::{AuthenticatedClient, HttpTransport, Transport};
//! use routelink_common::ClientConfig;
//!
//! # async fn demo(raw: Arc<dyn HttpTransport>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("https://api.example.com");
//! let refresher = EndpointRefresher::new(
//!     Transport::new(Arc::clone(&raw)),
//!     "https://api.example.com/auth/refresh",
//!     config.timeout,
//! );
//! let session = SessionContext::new(
//!     Arc::new(CredentialStore::in_memory()),
//!     Arc::new(refresher),
//!     RefreshSettings::from(&config),
//! );
//! let client = AuthenticatedClient::new(config, raw, session)?;
//!
//! let routes: serde_json::Value = client.get("/routes").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::transport::{HttpTransport, Outcome, Transport};
use super::types::{HttpRequest, HttpResponse, Method};
use crate::auth::{SessionContext, SessionEvent, Subscription, TokenSet};
use crate::cache::{CacheStats, ResponseCache};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, CredentialError};

/// One API call with optional per-call overrides of the client defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP verb
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// Query pairs appended to the URL
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// Cache override; `None` follows the client config
    pub enable_cache: Option<bool>,
    /// TTL override for cached GETs
    pub cache_ttl: Option<Duration>,
    /// Dedup override; `None` follows the client config
    pub dedupe: Option<bool>,
    /// Retries after the first attempt
    pub retry_attempts: Option<u32>,
    /// Per-attempt timeout override
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    /// Spec with no overrides.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            enable_cache: None,
            cache_ttl: None,
            dedupe: None,
            retry_attempts: None,
            timeout: None,
        }
    }

    /// `GET` spec.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// `POST` spec.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// `PUT` spec.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// `PATCH` spec.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// `DELETE` spec.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Append a query pair.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override caching for this call.
    #[must_use]
    pub fn cache(mut self, enabled: bool) -> Self {
        self.enable_cache = Some(enabled);
        self
    }

    /// Override the cache TTL for this call.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Override dedup for this call.
    #[must_use]
    pub fn dedupe(mut self, enabled: bool) -> Self {
        self.dedupe = Some(enabled);
        self
    }

    /// Override the retry budget for this call.
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A request with the client defaults applied and its URL resolved.
#[derive(Debug)]
struct PreparedCall {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
    retry_attempts: u32,
    timeout: Duration,
}

struct ClientInner {
    config: ClientConfig,
    transport: Transport,
    session: SessionContext,
    cache: ResponseCache<Value>,
    refresh_url: String,
}

/// Authenticated, retrying, caching API client.
///
/// Cheap to clone; clones share the cache and the session.
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<ClientInner>,
}

impl AuthenticatedClient {
    /// # Errors
    /// Returns [`ClientError::Config`] if the configuration is invalid.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        session: SessionContext,
    ) -> ClientResult<Self> {
        config.validate().map_err(|e| ClientError::Config(e.to_string()))?;
        let refresh_url = config.refresh_url()?;
        let cache = ResponseCache::with_clock(Arc::clone(session.clock()));

        info!(base_url = %config.base_url, "authenticated client ready");
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                transport: Transport::new(transport),
                session,
                cache,
                refresh_url,
            }),
        })
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Session backing the client.
    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    /// Perform a request and decode the JSON response into `T`.
    ///
    /// Empty response bodies decode from JSON `null`.
    ///
    /// # Errors
    /// See [`ClientError`]; transient failures are only surfaced once the
    /// retry budget is exhausted.
    pub async fn request<T: DeserializeOwned>(&self, spec: RequestSpec) -> ClientResult<T> {
        let value = self.request_value(spec).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Perform a request and return the raw JSON response.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    #[instrument(skip(self, spec), fields(method = %spec.method, path = %spec.path))]
    pub async fn request_value(&self, spec: RequestSpec) -> ClientResult<Value> {
        let config = &self.inner.config;
        let url = resolve_url(&config.base_url, &spec.path, &spec.query)?;
        let body = spec
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        let call = Arc::new(PreparedCall {
            method: spec.method,
            url,
            headers: spec.headers,
            body,
            retry_attempts: spec.retry_attempts.unwrap_or(config.retry_attempts),
            timeout: spec.timeout.unwrap_or(config.timeout),
        });

        if call.method != Method::Get {
            return self.execute(call, false).await;
        }

        let ttl = spec.cache_ttl.unwrap_or(config.cache_ttl);
        let cacheable = spec.enable_cache.unwrap_or(config.enable_cache) && !ttl.is_zero();
        let dedupe = spec.dedupe.unwrap_or(config.dedupe_requests);
        let key = format!("{} {}", call.method, call.url);

        if cacheable {
            if let Some(value) = self.inner.cache.read(&key) {
                debug!(%key, "cache hit");
                return Ok(value);
            }
        }

        if !dedupe {
            let value = self.execute(call, false).await?;
            if cacheable {
                self.inner.cache.write(key, value.clone(), ttl);
            }
            return Ok(value);
        }

        let client = self.clone();
        let cache_key = key.clone();
        self.inner
            .cache
            .attach_or_create(&key, move || async move {
                let value = client.execute(call, false).await?;
                // Written before the pending entry is released.
                if cacheable {
                    client.inner.cache.write(cache_key, value.clone(), ttl);
                }
                Ok(value)
            })
            .await
    }

    /// Attempt loop for one call, including the single post-refresh replay.
    fn execute(
        &self,
        call: Arc<PreparedCall>,
        is_retry: bool,
    ) -> BoxFuture<'static, ClientResult<Value>> {
        let client = self.clone();
        async move {
            let mut retry = 0u32;
            loop {
                let (request, sent_token) = client.build_request(&call);
                match client.inner.transport.attempt(request, call.timeout).await {
                    Outcome::Success(response) => return decode_body(&response),
                    Outcome::Retryable(err) if retry < call.retry_attempts => {
                        retry += 1;
                        let delay = client.inner.config.retry_base_delay.saturating_mul(retry);
                        warn!(url = %call.url, retry, ?delay, error = %err, "retrying request");
                        tokio::time::sleep(delay).await;
                    }
                    Outcome::Terminal(err) if err.is_unauthorized() => {
                        return client.recover_unauthorized(call, is_retry, sent_token).await;
                    }
                    Outcome::Retryable(err) | Outcome::Terminal(err) => return Err(err),
                }
            }
        }
        .boxed()
    }

    async fn recover_unauthorized(
        &self,
        call: Arc<PreparedCall>,
        is_retry: bool,
        sent_token: Option<String>,
    ) -> ClientResult<Value> {
        if is_retry {
            warn!(url = %call.url, "request rejected again after refresh");
            return Err(ClientError::Unauthenticated);
        }
        if call.url == self.inner.refresh_url {
            return Err(ClientError::Unauthenticated);
        }
        let Some(current) = self.inner.session.store().access_token() else {
            return Err(ClientError::Unauthenticated);
        };

        // Rejected token was already replaced; replay without another refresh.
        if sent_token.as_deref() != Some(current.as_str()) {
            debug!(url = %call.url, "stale access token rejected, replaying");
            return self.execute(call, true).await;
        }

        debug!(url = %call.url, "access token rejected, refreshing");
        self.inner.session.coordinator().ensure_fresh().await?;
        self.execute(call, true).await
    }

    /// Build one attempt; also returns the access token it carries.
    fn build_request(&self, call: &PreparedCall) -> (HttpRequest, Option<String>) {
        let mut request = HttpRequest::new(call.method, call.url.clone())
            .header("Accept", "application/json");
        if let Some(body) = &call.body {
            request = request.header("Content-Type", "application/json").body(body.clone());
        }
        for (name, value) in &call.headers {
            request = request.header(name.clone(), value.clone());
        }
        let token = self.inner.session.store().access_token();
        if let Some(token) = &token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        (request, token)
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(RequestSpec::get(path)).await
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(RequestSpec::post(path).json(to_json(body)?)).await
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(RequestSpec::put(path).json(to_json(body)?)).await
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(RequestSpec::patch(path).json(to_json(body)?)).await
    }

    /// # Errors
    /// See [`request`](Self::request).
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(RequestSpec::delete(path)).await
    }

    /// Drop cached responses whose key contains `pattern`, or all of them.
    ///
    /// Keys have the form `"{METHOD} {absolute url}"`.
    pub fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        self.inner.cache.invalidate(pattern)
    }

    /// Response cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Observe login, refresh and logout.
    pub fn on_session_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.session.store().subscribe(listener)
    }

    /// Start a session with tokens obtained from a login flow.
    ///
    /// # Errors
    /// Returns an error if the tokens are invalid or could not be persisted.
    pub async fn sign_in(&self, tokens: TokenSet) -> Result<(), CredentialError> {
        self.inner.cache.invalidate(None);
        self.inner.session.store().set(tokens).await
    }

    /// End the session and drop every cached response.
    ///
    /// # Errors
    /// Returns the backend error after the session has been cleared.
    pub async fn sign_out(&self) -> Result<bool, CredentialError> {
        self.inner.cache.invalidate(None);
        self.inner.session.store().clear().await
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.inner.config.base_url)
            .field("refresh_url", &self.inner.refresh_url)
            .finish_non_exhaustive()
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> ClientResult<Value> {
    serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}

fn decode_body(response: &HttpResponse) -> ClientResult<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Join `path` onto `base` (absolute URLs pass through) and append `query`.
pub(crate) fn resolve_url(base: &str, path: &str, query: &[(String, String)]) -> ClientResult<String> {
    let mut url = match Url::parse(path) {
        Ok(absolute) => absolute,
        Err(_) => {
            let joined =
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
            Url::parse(&joined)
                .map_err(|e| ClientError::Config(format!("invalid URL {joined}: {e}")))?
        }
    };

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::auth::{CredentialStore, RefreshSettings};
    use crate::http::TransportFailure;
    use crate::testing::{fixtures, MockClock, MockRefresher, ScriptedTransport};

    const BASE: &str = "http://api.test/v1";

    struct Harness {
        client: AuthenticatedClient,
        transport: Arc<ScriptedTransport>,
        refresher: Arc<MockRefresher>,
        clock: MockClock,
    }

    async fn harness(config: ClientConfig) -> Harness {
        let clock = MockClock::new();
        let store = Arc::new(CredentialStore::in_memory());
        store
            .set(fixtures::session(&clock, "access-0", Duration::from_secs(3600)))
            .await
            .expect("set");
        let refresher = Arc::new(MockRefresher::new());
        let transport = Arc::new(ScriptedTransport::new());
        let session = SessionContext::with_clock(
            store,
            refresher.clone(),
            RefreshSettings::from(&config),
            Arc::new(clock.clone()),
        );
        let client = AuthenticatedClient::new(config, transport.clone(), session).expect("client");
        Harness { client, transport, refresher, clock }
    }

    fn config() -> ClientConfig {
        ClientConfig { retry_base_delay: Duration::from_millis(1), ..ClientConfig::new(BASE) }
    }

    fn url(path: &str) -> String {
        format!("{BASE}{path}")
    }

    #[test]
    fn resolves_relative_and_absolute_urls() {
        assert_eq!(resolve_url(BASE, "/routes", &[]).expect("url"), "http://api.test/v1/routes");
        assert_eq!(
            resolve_url("http://api.test/v1/", "routes", &[]).expect("url"),
            "http://api.test/v1/routes"
        );
        assert_eq!(
            resolve_url(BASE, "https://other.test/x", &[]).expect("url"),
            "https://other.test/x"
        );
        let with_query =
            resolve_url(BASE, "/routes", &[("page".into(), "2".into()), ("q".into(), "a b".into())])
                .expect("url");
        assert_eq!(with_query, "http://api.test/v1/routes?page=2&q=a+b");
    }

    #[tokio::test]
    async fn attaches_bearer_token() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/me"), 200, r#"{"id":7}"#);

        let me: Value = h.client.get("/me").await.expect("request");

        assert_eq!(me["id"], 7);
        let sent = h.transport.requests_to(&url("/me"));
        assert_eq!(sent[0].bearer_token(), Some("access-0"));
        assert_eq!(sent[0].header_value("accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn get_is_served_from_cache() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes"), 200, "[1,2]");

        let first: Vec<u32> = h.client.get("/routes").await.expect("first");
        let second: Vec<u32> = h.client.get("/routes").await.expect("second");

        assert_eq!(first, second);
        assert_eq!(h.transport.request_count(), 1);
        assert_eq!(h.client.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn cache_entry_expires_with_clock() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes"), 200, "[1]");
        h.transport.enqueue(&url("/routes"), 200, "[2]");
        let spec = || RequestSpec::get("/routes").cache_ttl(Duration::from_millis(100));

        let first: Vec<u32> = h.client.request(spec()).await.expect("first");
        h.clock.advance(Duration::from_millis(150));
        let second: Vec<u32> = h.client.request(spec()).await.expect("second");

        assert_eq!((first, second), (vec![1], vec![2]));
    }

    #[tokio::test]
    async fn mutations_bypass_cache() {
        let h = harness(config()).await;
        h.transport.set_handler(|_| Ok(HttpResponse::new(201, r#"{"ok":true}"#)));

        let body = serde_json::json!({"name": "a"});
        let _: Value = h.client.post("/routes", &body).await.expect("post");
        let _: Value = h.client.post("/routes", &body).await.expect("post");

        assert_eq!(h.transport.request_count(), 2);
        assert_eq!(h.client.cache_stats().size, 0);
        let sent = h.transport.requests();
        assert_eq!(sent[0].header_value("content-type"), Some("application/json"));
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"name":"a"}"#));
    }

    #[tokio::test]
    async fn empty_body_decodes_as_null() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes/1"), 204, "");

        let result: Option<Value> = h.client.delete("/routes/1").await.expect("delete");

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes"), 422, "bad input");

        let err = h.client.request_value(RequestSpec::post("/routes")).await.expect_err("422");

        assert_eq!(err, ClientError::HttpStatus { status: 422, body: "bad input".into() });
        assert_eq!(h.transport.request_count(), 1);
    }

    #[tokio::test]
    async fn server_errors_retry_until_success() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes"), 503, "");
        h.transport.enqueue(&url("/routes"), 503, "");
        h.transport.enqueue(&url("/routes"), 200, "[]");

        let routes: Vec<u32> = h.client.get("/routes").await.expect("request");

        assert!(routes.is_empty());
        assert_eq!(h.transport.request_count(), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_per_call() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes"), 503, "");
        h.transport.enqueue(&url("/routes"), 503, "");
        h.transport.enqueue(&url("/routes"), 200, "[]");

        let err = h
            .client
            .request_value(RequestSpec::get("/routes").retry_attempts(1))
            .await
            .expect_err("should exhaust retries");

        assert_eq!(err.status(), Some(503));
        assert_eq!(h.transport.request_count(), 2);
    }

    #[tokio::test]
    async fn connection_failures_retry_until_success() {
        let h = harness(config()).await;
        let failure = || TransportFailure::Connection("connection reset".into());
        h.transport.enqueue_failure(&url("/routes"), failure());
        h.transport.enqueue_failure(&url("/routes"), failure());
        h.transport.enqueue(&url("/routes"), 200, "[3]");

        let routes: Vec<u32> = h.client.get("/routes").await.expect("request");

        assert_eq!(routes, vec![3]);
        assert_eq!(h.transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly() {
        let h = harness(ClientConfig {
            retry_base_delay: Duration::from_millis(100),
            ..ClientConfig::new(BASE)
        })
        .await;
        for _ in 0..3 {
            h.transport.enqueue(&url("/routes"), 503, "");
        }
        h.transport.enqueue(&url("/routes"), 200, "[]");

        let start = tokio::time::Instant::now();
        let _: Value = h.client.get("/routes").await.expect("request");
        let waited = start.elapsed();

        // 100 + 200 + 300
        assert!(waited >= Duration::from_millis(600), "waited {waited:?}");
        assert!(waited < Duration::from_millis(700), "waited {waited:?}");
        assert_eq!(h.transport.request_count(), 4);
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_replays_once() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/me"), 401, "expired");
        h.transport.enqueue(&url("/me"), 200, r#"{"id":1}"#);

        let me: Value = h.client.get("/me").await.expect("request");

        assert_eq!(me["id"], 1);
        assert_eq!(h.refresher.calls(), 1);
        let sent = h.transport.requests_to(&url("/me"));
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].bearer_token(), Some("access-0"));
        assert_eq!(sent[1].bearer_token(), Some("refreshed-token-1"));
    }

    #[tokio::test]
    async fn second_unauthorized_is_terminal() {
        let h = harness(config()).await;
        h.transport.set_handler(|_| Ok(HttpResponse::new(401, "nope")));

        let err = h.client.request_value(RequestSpec::get("/me")).await.expect_err("401");

        assert_eq!(err, ClientError::Unauthenticated);
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_unauthorized_with_replaced_token_replays_without_refresh() {
        let h = harness(config()).await;
        h.transport.set_handler(|req| {
            if req.bearer_token() == Some("access-0") {
                Ok(HttpResponse::new(401, "expired"))
            } else {
                Ok(HttpResponse::new(200, "{}"))
            }
        });
        h.transport.set_latency_for(&url("/fast"), Duration::from_millis(10));
        h.transport.set_latency_for(&url("/slow"), Duration::from_millis(200));
        h.refresher.set_latency(Duration::from_millis(10));

        let (fast, slow) = tokio::join!(
            h.client.request_value(RequestSpec::get("/fast")),
            h.client.request_value(RequestSpec::get("/slow")),
        );

        assert!(fast.is_ok() && slow.is_ok(), "fast: {fast:?}, slow: {slow:?}");
        assert_eq!(h.refresher.calls(), 1);
        let sent = h.transport.requests_to(&url("/slow"));
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].bearer_token(), Some("refreshed-token-1"));
    }

    #[tokio::test]
    async fn unauthorized_refresh_endpoint_does_not_recurse() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/auth/refresh"), 401, "");

        let err = h
            .client
            .request_value(RequestSpec::post("/auth/refresh"))
            .await
            .expect_err("401");

        assert_eq!(err, ClientError::Unauthenticated);
        assert_eq!(h.refresher.calls(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_clears_session() {
        let h = harness(config()).await;
        h.refresher.push_result(Err(ClientError::HttpStatus { status: 401, body: String::new() }));
        h.transport.enqueue(&url("/me"), 401, "");
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleared);
        let _subscription = h.client.on_session_change(move |event| {
            if *event == SessionEvent::Cleared {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = h.client.request_value(RequestSpec::get("/me")).await.expect_err("401");

        assert_eq!(err, ClientError::Unauthenticated);
        assert!(!h.client.session().store().is_authenticated());
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sign_out_drops_cache_and_session() {
        let h = harness(config()).await;
        h.transport.enqueue(&url("/routes"), 200, "[]");
        let _: Value = h.client.get("/routes").await.expect("request");

        assert!(h.client.sign_out().await.expect("sign out"));

        assert_eq!(h.client.cache_stats().size, 0);
        assert!(!h.client.session().store().is_authenticated());
        assert!(!h.client.sign_out().await.expect("second sign out"));
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let store = Arc::new(CredentialStore::in_memory());
        let session =
            SessionContext::new(store, Arc::new(MockRefresher::new()), RefreshSettings::default());
        let result = AuthenticatedClient::new(
            ClientConfig::new(""),
            Arc::new(ScriptedTransport::new()),
            session,
        );

        assert!(matches!(result, Err(ClientError::Config(_))));
    }
}
