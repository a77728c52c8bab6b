//! Mock implementations of the client's seams
//!
//! Provides scripted doubles for [`HttpTransport`] and [`TokenRefresher`].

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{TokenRefresher, TokenResponse};
use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportFailure};

type ScriptedResult = Result<HttpResponse, TransportFailure>;
type Handler = Arc<dyn Fn(&HttpRequest) -> ScriptedResult + Send + Sync>;

/// Transport that replays scripted responses per URL.
///
/// Each URL has its own queue; queued results are consumed in order. Once a
/// queue is empty the handler (if any) answers, otherwise the request gets a
/// `404`. Every request is recorded.
///
/// # Examples
///
/// ```
/// use routelink_common::testing::ScriptedTransport;
///
/// let transport = ScriptedTransport::new();
/// transport.enqueue("http://api.test/routes", 503, "");
/// transport.enqueue("http://api.test/routes", 200, "[]");
/// assert_eq!(transport.request_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    queues: Arc<Mutex<HashMap<String, VecDeque<ScriptedResult>>>>,
    handler: Arc<Mutex<Option<Handler>>>,
    latency: Arc<Mutex<Duration>>,
    url_latency: Arc<Mutex<HashMap<String, Duration>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    /// Empty transport: no queues, no handler, no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`.
    pub fn enqueue(&self, url: &str, status: u16, body: &str) {
        self.queues
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    /// Queue a transport-level failure for `url`.
    pub fn enqueue_failure(&self, url: &str, failure: TransportFailure) {
        self.queues.lock().entry(url.to_string()).or_default().push_back(Err(failure));
    }

    /// Answer requests whose queue is empty.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&HttpRequest) -> ScriptedResult + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Delay responses for exactly `url` by `latency`, overriding [`Self::set_latency`].
    pub fn set_latency_for(&self, url: &str, latency: Duration) {
        self.url_latency.lock().insert(url.to_string(), latency);
    }

    /// All requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests sent to exactly `url`.
    #[must_use]
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests.lock().iter().filter(|req| req.url == url).cloned().collect()
    }

    fn next_result(&self, request: &HttpRequest) -> ScriptedResult {
        if let Some(result) = self.queues.lock().get_mut(&request.url).and_then(VecDeque::pop_front)
        {
            return result;
        }
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(request),
            None => Ok(HttpResponse::new(404, "no scripted response")),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        self.requests.lock().push(request.clone());
        let result = self.next_result(&request);

        let latency = self
            .url_latency
            .lock()
            .get(&request.url)
            .copied()
            .unwrap_or_else(|| *self.latency.lock());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

/// Refresher that counts calls and replays scripted results.
///
/// Without a scripted result it issues `refreshed-token-{n}` valid for one
/// hour, rotating the refresh token to `refresh-token-{n}`.
#[derive(Default)]
pub struct MockRefresher {
    calls: AtomicUsize,
    results: Mutex<VecDeque<Result<TokenResponse, ClientError>>>,
    latency: Mutex<Duration>,
    last_refresh_token: Mutex<Option<String>>,
}

impl MockRefresher {
    /// Refresher with no scripted results and no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next call.
    pub fn push_result(&self, result: Result<TokenResponse, ClientError>) {
        self.results.lock().push_back(result);
    }

    /// Delay every refresh by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of refresh calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh token passed to the most recent call.
    #[must_use]
    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().clone()
    }
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refresh_token.lock() = Some(refresh_token.to_string());

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.results.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TokenResponse::new(
                format!("refreshed-token-{call}"),
                Some(format!("refresh-token-{call}")),
                3600,
            ))
        })
    }
}
