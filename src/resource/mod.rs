//! Role-dispatched, retrying resource fetches.
//!
//! One `ResourceHook` per resource kind. A hook waits for the session to resolve,
//! selects the endpoint mapped to the session's role, fetches through the shared
//! `QueryCache`, normalizes the response envelope and retries transient failures
//! according to the kind's `RetryPolicy`.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::watch;

use crate::{
    classifier::{ClassifiedError, ErrorKind, classify},
    models::Role,
    session::SessionStore,
    transport::TransportState,
};

pub mod cache;
pub mod envelope;
pub mod retry;

use cache::{FetchOutcome, QueryCache};
use retry::RetryPolicy;

// --- Resource Kinds & Dispatch ---

/// ResourceKind
///
/// Each kind carries its own backoff ceiling. Ticket lists are interactive queues and
/// should recover quickly (5 s); requests and document threads are browsed lists that
/// tolerate a longer ceiling (30 s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Tickets,
    Requests,
    DocumentThreads,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Tickets => "tickets",
            ResourceKind::Requests => "requests",
            ResourceKind::DocumentThreads => "document-threads",
        }
    }

    /// Parses the URL segment form (`document-threads`).
    pub fn from_segment(segment: &str) -> Option<Self> {
        [
            ResourceKind::Tickets,
            ResourceKind::Requests,
            ResourceKind::DocumentThreads,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == segment)
    }

    /// Default dispatch table and retry policy for this kind.
    pub fn spec(&self) -> ResourceSpec {
        match self {
            ResourceKind::Tickets => ResourceSpec::tickets(),
            ResourceKind::Requests => ResourceSpec::requests(),
            ResourceKind::DocumentThreads => ResourceSpec::document_threads(),
        }
    }

    pub fn backoff_ceiling(&self) -> Duration {
        match self {
            ResourceKind::Tickets => Duration::from_millis(5_000),
            ResourceKind::Requests | ResourceKind::DocumentThreads => {
                Duration::from_millis(30_000)
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ResourceSpec
///
/// Static role -> endpoint table plus the retry policy for one resource kind.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub dispatch: BTreeMap<Role, String>,
    pub retry: RetryPolicy,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            dispatch: BTreeMap::new(),
            retry: RetryPolicy::with_ceiling(kind.backoff_ceiling()),
        }
    }

    pub fn route(mut self, role: Role, path: impl Into<String>) -> Self {
        self.dispatch.insert(role, path.into());
        self
    }

    /// Exact-match dispatch. An unmapped role is a configuration error.
    pub fn endpoint_for(&self, role: &Role) -> Result<&str, ResourceError> {
        self.dispatch
            .get(role)
            .map(String::as_str)
            .ok_or_else(|| ResourceError::UnsupportedRole {
                kind: self.kind,
                role: role.clone(),
            })
    }

    pub fn tickets() -> Self {
        Self::new(ResourceKind::Tickets)
            .route(Role::Admin, "/tickets/all")
            .route(Role::User, "/tickets/mine")
            .route(Role::Lawyer, "/tickets/assigned")
    }

    pub fn requests() -> Self {
        Self::new(ResourceKind::Requests)
            .route(Role::Admin, "/requests/all")
            .route(Role::User, "/requests/mine")
            .route(Role::HrManager, "/requests/assigned")
    }

    pub fn document_threads() -> Self {
        Self::new(ResourceKind::DocumentThreads)
            .route(Role::Admin, "/document-threads/all")
            .route(Role::User, "/document-threads/mine")
            .route(Role::Lawyer, "/document-threads/assigned")
    }
}

// --- Descriptors ---

/// Opaque filter/sort parameters, ordered so descriptors compare structurally.
pub type Filters = BTreeMap<String, String>;

/// ResourceQuery
///
/// Descriptor of one fetch: the cache/dedup key and the tag used to discard late
/// responses. It holds every input that affects the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceQuery {
    pub kind: ResourceKind,
    pub role: Role,
    pub endpoint: String,
    pub filters: Filters,
    pub cursor: Option<String>,
}

impl ResourceQuery {
    /// Query-string parameters sent with the request.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(cursor) = &self.cursor {
            params.push(("cursor".to_string(), cursor.clone()));
        }
        params
    }
}

// --- Errors & State ---

/// ResourceError
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    /// Configuration error: the role has no endpoint for this kind. Never retried.
    #[error("role '{role}' has no {kind} endpoint")]
    UnsupportedRole { kind: ResourceKind, role: Role },
    /// The session resolved without a role; no request was issued.
    #[error("no authenticated session to load {kind}")]
    Unauthenticated { kind: ResourceKind },
    #[error(transparent)]
    Fetch(#[from] ClassifiedError),
}

impl ResourceError {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ResourceError::Fetch(classified) => Some(classified.kind),
            _ => None,
        }
    }

    /// Timeout and network failures get the distinct recoverable presentation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.error_kind(),
            Some(ErrorKind::Timeout) | Some(ErrorKind::Network)
        )
    }
}

/// ResourceFailure
///
/// A failure as presented to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFailure {
    pub error: ResourceError,
    pub recoverable: bool,
    /// Whether a manual retry affordance should be offered.
    pub can_retry: bool,
}

impl From<ResourceError> for ResourceFailure {
    fn from(error: ResourceError) -> Self {
        let can_retry = matches!(
            error.error_kind(),
            Some(kind) if kind != ErrorKind::Auth
        );
        Self {
            recoverable: error.is_recoverable(),
            can_retry,
            error,
        }
    }
}

/// ResourceCollection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceCollection<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Value>,
}

/// ResourceState
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<T> {
    /// Waiting for a session role.
    Idle,
    Loading {
        query: ResourceQuery,
    },
    Ready {
        query: ResourceQuery,
        collection: ResourceCollection<T>,
    },
    Failed {
        query: Option<ResourceQuery>,
        failure: ResourceFailure,
    },
}

// --- The Hook ---

/// ResourceHook
///
/// One instantiation per resource kind. State is published through a `watch`
/// channel; only the result of the current descriptor is ever published.
pub struct ResourceHook<T> {
    spec: ResourceSpec,
    session: SessionStore,
    transport: TransportState,
    cache: Arc<QueryCache>,
    current: Mutex<Option<ResourceQuery>>,
    last_filters: Mutex<Filters>,
    state: watch::Sender<ResourceState<T>>,
}

impl<T> ResourceHook<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        spec: ResourceSpec,
        session: SessionStore,
        transport: TransportState,
        cache: Arc<QueryCache>,
    ) -> Self {
        let (state, _) = watch::channel(ResourceState::Idle);
        Self {
            spec,
            session,
            transport,
            cache,
            current: Mutex::new(None),
            last_filters: Mutex::new(Filters::new()),
            state,
        }
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn state(&self) -> ResourceState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.state.subscribe()
    }

    /// load
    ///
    /// Fetches the collection for the session's role and `filters`. Triggers the
    /// session bootstrap if it has not run yet and never issues a request before the
    /// session has resolved.
    ///
    /// 1. Session Resolution: no role means no request.
    /// 2. Dispatch: the role picks the endpoint; an unmapped role fails at once.
    /// 3. Descriptor: role, endpoint, filters and cursor become the current query.
    /// 4. Fetch: through the shared cache, retried per the kind's policy.
    /// 5. Staleness Check: a superseded query publishes nothing and touches nothing.
    /// 6. Session Loss: a 401 on the current query ends the session.
    /// 7. Publish: `Ready` or `Failed` for the current query.
    pub async fn load(&self, filters: Filters) -> Result<ResourceCollection<T>, ResourceError> {
        self.load_with(filters, false).await
    }

    /// refetch
    ///
    /// The retry affordance: repeats the last load, bypassing the cached result.
    pub async fn refetch(&self) -> Result<ResourceCollection<T>, ResourceError> {
        let filters = self
            .last_filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.load_with(filters, true).await
    }

    async fn load_with(
        &self,
        filters: Filters,
        force: bool,
    ) -> Result<ResourceCollection<T>, ResourceError> {
        let kind = self.spec.kind;

        // 1. Session Resolution
        let mut session = self.session.get_state();
        if session.is_bootstrapping() {
            session = self.session.bootstrap().await;
        }
        let Some(role) = session.role().cloned() else {
            self.reset();
            return Err(ResourceError::Unauthenticated { kind });
        };

        // 2. Dispatch
        let endpoint = match self.spec.endpoint_for(&role) {
            Ok(endpoint) => endpoint.to_string(),
            Err(error) => {
                tracing::error!(resource = %kind, %role, "no endpoint mapped for role");
                *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
                self.state.send_replace(ResourceState::Failed {
                    query: None,
                    failure: error.clone().into(),
                });
                return Err(error);
            }
        };

        // 3. Descriptor
        let mut query_filters = filters.clone();
        let cursor = query_filters.remove("cursor");
        let query = ResourceQuery {
            kind,
            role,
            endpoint,
            filters: query_filters,
            cursor,
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(query.clone());
        *self.last_filters.lock().unwrap_or_else(PoisonError::into_inner) = filters;
        self.state.send_replace(ResourceState::Loading {
            query: query.clone(),
        });

        // 4. Fetch
        if force {
            self.cache.invalidate(&query);
        }
        let outcome = self
            .cache
            .get_or_fetch(&query, || self.fetch_with_retry(&query))
            .await;

        let result = outcome.map(|raw| ResourceCollection {
            items: envelope::decode_items::<T>(kind, &raw),
            paging: raw.paging.clone(),
        });

        // 5. Staleness Check
        if !self.is_current(&query) {
            tracing::debug!(resource = %kind, "discarding result of superseded query");
            return result;
        }

        // 6. Session Loss
        // A 401 ends the session: the store re-bootstraps and resolves to
        // `Unauthenticated`, which sends the gate to the login route.
        if let Err(ResourceError::Fetch(classified)) = &result {
            if classified.kind == ErrorKind::Auth {
                tracing::info!(resource = %kind, "auth failure, session lost");
                self.reset();
                self.session.refresh().await;
                return result;
            }
        }

        // 7. Publish
        let next = match &result {
            Ok(collection) => ResourceState::Ready {
                query,
                collection: collection.clone(),
            },
            Err(error) => ResourceState::Failed {
                query: Some(query),
                failure: error.clone().into(),
            },
        };
        self.state.send_replace(next);

        result
    }

    /// A result may be published only while its descriptor is still the newest one
    /// and the session still carries the role it was fetched for.
    fn is_current(&self, query: &ResourceQuery) -> bool {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.as_ref() == Some(query) && self.session.get_state().role() == Some(&query.role)
    }

    fn reset(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(ResourceState::Idle);
    }

    /// One fetch of `query`: each failure is classified and, while the policy allows,
    /// retried after the backoff delay. Envelopes are normalized on success.
    async fn fetch_with_retry(&self, query: &ResourceQuery) -> FetchOutcome {
        let params = query.params();
        let policy = self.spec.retry;
        let mut attempt = 0;

        loop {
            match self.transport.get_json(&query.endpoint, &params).await {
                Ok(body) => return Ok(Arc::new(envelope::normalize(query.kind, body))),
                Err(e) => {
                    let classified = classify(&e);
                    if !policy.should_retry(&classified, attempt) {
                        tracing::warn!(
                            resource = %query.kind,
                            endpoint = %query.endpoint,
                            attempts = attempt + 1,
                            error = %classified,
                            "fetch failed"
                        );
                        return Err(classified.into());
                    }

                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        resource = %query.kind,
                        endpoint = %query.endpoint,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %classified,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// run
    ///
    /// Reaction loop: loads when the session gains a role, reloads under a fresh
    /// descriptor when the role or the filters change, and falls back to `Idle` when
    /// the role goes away. Returns when either input channel closes.
    pub async fn run(&self, mut filters: watch::Receiver<Filters>) {
        let mut session = self.session.subscribe();
        let mut active_role: Option<Role> = None;
        let mut current_filters = filters.borrow_and_update().clone();

        loop {
            let snapshot = session.borrow_and_update().clone();
            let role = if snapshot.is_bootstrapping() {
                None
            } else {
                snapshot.role().cloned()
            };

            if role != active_role {
                self.reset();
                if active_role.is_some() {
                    self.cache.invalidate_kind(self.spec.kind);
                }
                active_role = role;
                if active_role.is_some() {
                    // Failures are published through the state channel.
                    let _ = self.load(current_filters.clone()).await;
                }
            }

            tokio::select! {
                changed = session.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                changed = filters.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    current_filters = filters.borrow_and_update().clone();
                    if active_role.is_some() {
                        let _ = self.load(current_filters.clone()).await;
                    }
                }
            }
        }
    }
}
