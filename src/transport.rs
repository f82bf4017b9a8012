use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{config::AppConfig, storage::CookieJar};

/// TransportError
///
/// Raw description of a failed remote operation as seen at the transport boundary.
/// It carries every signal the Error Classifier needs and nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportError {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    pub message: String,
    /// Transport-level error code (e.g. `ECONNABORTED`), when one is known.
    pub code: Option<String>,
    /// The client-side deadline elapsed.
    pub timed_out: bool,
    /// The remote host could not be reached at all.
    pub unreachable: bool,
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            status: error.status().map(|status| status.as_u16()),
            message: error.to_string(),
            code: None,
            timed_out: error.is_timeout(),
            unreachable: error.is_connect(),
        }
    }
}

// 1. Transport Contract
/// Transport
///
/// The abstract contract for every call the core makes to the remote API. The session
/// store and resource hooks only ever talk to this trait, so the real HTTP client and
/// the scripted mock are interchangeable.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET and returns the decoded JSON body. Non-2xx responses are errors.
    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError>;

    /// Issues a body-less POST (logout and similar triggers).
    async fn post(&self, path: &str) -> Result<(), TransportError>;
}

/// TransportState
///
/// The concrete type used to share transport access across the per-tab components.
pub type TransportState = Arc<dyn Transport>;

// 2. The Real Implementation
/// HttpTransport
///
/// `reqwest` client sharing the tab's cookie jar, so session credentials and the
/// `NEXT_LOCALE` cookie ride along on every request the way a browser sends them.
/// The configured `request_timeout` is the fixed client-side deadline.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &AppConfig, cookies: &CookieJar) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(&config.api_base_url)
            .map_err(|e| TransportError::other(format!("invalid API base URL: {}", e)))?;

        // Url::join replaces the last segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.jar())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::other(format!("invalid request path {}: {}", path, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "GET");

        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(
                status.as_u16(),
                error_message(status, &body),
            ));
        }

        Ok(response.json::<Value>().await?)
    }

    async fn post(&self, path: &str) -> Result<(), TransportError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "POST");

        let response = self.client.post(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(
                status.as_u16(),
                error_message(status, &body),
            ));
        }
        Ok(())
    }
}

/// Prefers the API's own `{"message": ...}` over the canonical status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

// 3. The Mock Implementation
/// MockReply
///
/// A scripted answer for one call to a mocked path.
#[derive(Debug, Clone)]
pub enum MockReply {
    Json(Value),
    Fail(TransportError),
    /// Never resolves, simulating an indefinitely pending request.
    Hang,
}

/// RecordedCall
///
/// One call observed by `MockTransport`, stamped with the (possibly paused) tokio clock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub at: tokio::time::Instant,
}

/// MockTransport
///
/// Scripted transport for tests. Replies are queued per path and consumed in order;
/// the last reply for a path is sticky. Unscripted paths answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for `path`.
    pub fn on(&self, path: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Delays every reply by `latency`, so concurrent callers overlap in flight.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.path == path)
            .count()
    }

    fn record(&self, method: &'static str, path: &str, query: &[(String, String)]) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method,
                path: path.to_string(),
                query: query.to_vec(),
                at: tokio::time::Instant::now(),
            });
    }

    fn next_reply(&self, path: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    async fn reply(&self, path: &str) -> Result<Value, TransportError> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_reply(path) {
            Some(MockReply::Json(value)) => Ok(value),
            Some(MockReply::Fail(error)) => Err(error),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(TransportError::status(
                404,
                format!("no mock route for {}", path),
            )),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        self.record("GET", path, query);
        self.reply(path).await
    }

    async fn post(&self, path: &str) -> Result<(), TransportError> {
        self.record("POST", path, &[]);
        self.reply(path).await.map(|_| ())
    }
}
