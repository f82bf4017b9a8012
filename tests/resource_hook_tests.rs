use portal_gate::{
    classifier::ErrorKind,
    models::{Role, ServiceRequest, Ticket},
    resource::{
        Filters, ResourceError, ResourceHook, ResourceSpec, ResourceState, cache::QueryCache,
        retry::RetryPolicy,
    },
    session::{IDENTITY_PATH, SessionPhase, SessionStore},
    transport::{MockReply, MockTransport, TransportError, TransportState},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

// --- Helpers ---

fn identity(role: &str) -> serde_json::Value {
    json!({
        "user": {
            "id": "00000000-0000-0000-0000-000000000001",
            "email": "someone@portal.local",
            "role": role,
        }
    })
}

fn ticket(n: u128, status: &str) -> serde_json::Value {
    json!({
        "id": uuid::Uuid::from_u128(n),
        "subject": format!("ticket {}", n),
        "status": status,
    })
}

/// Mock transport whose identity oracle answers with `role`.
fn signed_in(role: &str, mock: MockTransport) -> (Arc<MockTransport>, SessionStore) {
    let mock = Arc::new(mock);
    mock.on(IDENTITY_PATH, MockReply::Json(identity(role)));
    let session = SessionStore::new(mock.clone() as TransportState, Duration::from_secs(10));
    (mock, session)
}

fn hook<T>(spec: ResourceSpec, mock: &Arc<MockTransport>, session: &SessionStore) -> ResourceHook<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    ResourceHook::new(
        spec,
        session.clone(),
        mock.clone() as TransportState,
        Arc::new(QueryCache::default()),
    )
}

fn filters(pairs: &[(&str, &str)]) -> Filters {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

// --- Role Dispatch ---

#[tokio::test]
async fn test_each_role_hits_its_own_endpoint() {
    for (role, endpoint) in [
        ("admin", "/tickets/all"),
        ("user", "/tickets/mine"),
        ("LAWYER", "/tickets/assigned"),
    ] {
        let (mock, session) = signed_in(role, MockTransport::new());
        mock.on(endpoint, MockReply::Json(json!([ticket(1, "open")])));
        let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

        let collection = tickets.load(Filters::new()).await.unwrap();

        assert_eq!(collection.items.len(), 1, "role {}", role);
        assert_eq!(mock.calls_to(endpoint), 1, "role {}", role);
    }
}

#[tokio::test]
async fn test_hr_manager_reads_assigned_requests_in_nested_envelope() {
    let (mock, session) = signed_in("HR-manager", MockTransport::new());
    mock.on(
        "/requests/assigned",
        MockReply::Json(json!({"data": [
            {"id": uuid::Uuid::from_u128(7), "title": "Leave", "status": "pending", "type": "leave"}
        ]})),
    );
    let requests = hook::<ServiceRequest>(ResourceSpec::requests(), &mock, &session);

    let collection = requests.load(Filters::new()).await.unwrap();

    assert_eq!(collection.items[0].request_type.as_deref(), Some("leave"));
}

#[tokio::test]
async fn test_unsupported_role_fails_without_request() {
    let (mock, session) = signed_in("hr-manager", MockTransport::new());
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let result = tickets.load(Filters::new()).await;

    assert!(matches!(result, Err(ResourceError::UnsupportedRole { .. })));
    // Only the identity oracle was called.
    assert_eq!(mock.calls().len(), 1);
    match tickets.state() {
        ResourceState::Failed { query, failure } => {
            assert!(query.is_none());
            assert!(!failure.can_retry);
            assert!(!failure.recoverable);
        }
        other => panic!("expected failed state, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_request_without_session() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
        IDENTITY_PATH,
        MockReply::Fail(TransportError::status(401, "Unauthorized")),
    );
    let session = SessionStore::new(mock.clone() as TransportState, Duration::from_secs(10));
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let result = tickets.load(Filters::new()).await;

    assert!(matches!(result, Err(ResourceError::Unauthenticated { .. })));
    assert_eq!(tickets.state(), ResourceState::Idle);
    assert_eq!(mock.calls().len(), 1);
}

// --- Retry ---

#[tokio::test(start_paused = true)]
async fn test_network_failure_retries_with_backoff_then_surfaces_recoverable() {
    let (mock, session) = signed_in("admin", MockTransport::new());
    mock.on(
        "/tickets/all",
        MockReply::Fail(TransportError::unreachable("Network Error")),
    );
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let result = tickets.load(Filters::new()).await;

    let calls: Vec<_> = mock
        .calls()
        .into_iter()
        .filter(|call| call.path == "/tickets/all")
        .collect();
    assert_eq!(calls.len(), 3);
    let first_gap = calls[1].at - calls[0].at;
    let second_gap = calls[2].at - calls[1].at;
    assert!(first_gap >= Duration::from_millis(1000) && first_gap < Duration::from_millis(1100));
    assert!(second_gap >= Duration::from_millis(2000) && second_gap < Duration::from_millis(2100));

    let error = result.unwrap_err();
    assert_eq!(error.error_kind(), Some(ErrorKind::Network));
    match tickets.state() {
        ResourceState::Failed { failure, .. } => {
            assert!(failure.recoverable);
            assert!(failure.can_retry);
        }
        other => panic!("expected failed state, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_respects_ceiling() {
    let (mock, session) = signed_in("admin", MockTransport::new());
    mock.on(
        "/tickets/all",
        MockReply::Fail(TransportError::status(502, "Bad Gateway")),
    );
    let mut spec = ResourceSpec::tickets();
    spec.retry = RetryPolicy::with_ceiling(Duration::from_millis(1500));
    let tickets = hook::<Ticket>(spec, &mock, &session);

    let _ = tickets.load(Filters::new()).await;

    let calls: Vec<_> = mock
        .calls()
        .into_iter()
        .filter(|call| call.path == "/tickets/all")
        .collect();
    assert_eq!(calls.len(), 3);
    let second_gap = calls[2].at - calls[1].at;
    assert!(second_gap >= Duration::from_millis(1500) && second_gap < Duration::from_millis(1600));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_retried() {
    let (mock, session) = signed_in("admin", MockTransport::new());
    mock.on(
        "/tickets/all",
        MockReply::Fail(TransportError::timeout("timeout of 15000ms exceeded")),
    );
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let error = tickets.load(Filters::new()).await.unwrap_err();

    assert_eq!(mock.calls_to("/tickets/all"), 1);
    assert_eq!(error.error_kind(), Some(ErrorKind::Timeout));
    assert!(error.is_recoverable());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let (mock, session) = signed_in("user", MockTransport::new());
    mock.on(
        "/tickets/mine",
        MockReply::Fail(TransportError::status(500, "Internal Server Error")),
    );
    mock.on("/tickets/mine", MockReply::Json(json!([ticket(2, "open")])));
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let collection = tickets.load(Filters::new()).await.unwrap();

    assert_eq!(collection.items.len(), 1);
    assert_eq!(mock.calls_to("/tickets/mine"), 2);
    assert!(matches!(tickets.state(), ResourceState::Ready { .. }));
}

#[tokio::test]
async fn test_auth_failure_ends_session_without_retry() {
    let (mock, session) = signed_in("admin", MockTransport::new());
    mock.on(
        IDENTITY_PATH,
        MockReply::Fail(TransportError::status(401, "Unauthorized")),
    );
    mock.on(
        "/tickets/all",
        MockReply::Fail(TransportError::status(401, "Unauthorized")),
    );
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let error = tickets.load(Filters::new()).await.unwrap_err();

    assert_eq!(error.error_kind(), Some(ErrorKind::Auth));
    assert_eq!(mock.calls_to("/tickets/all"), 1);
    // The store bootstrapped again and settled instead of waiting in Uninitialized.
    assert_eq!(mock.calls_to(IDENTITY_PATH), 2);
    let state = session.get_state();
    assert_eq!(state.phase(), &SessionPhase::Unauthenticated);
    assert!(!state.is_bootstrapping());
    // Nothing is shown for a session that no longer exists.
    assert_eq!(tickets.state(), ResourceState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_late_auth_failure_does_not_end_newer_session() {
    let (mock, session) = signed_in(
        "admin",
        MockTransport::new().with_latency(Duration::from_millis(200)),
    );
    mock.on(IDENTITY_PATH, MockReply::Json(identity("user")));
    mock.on(
        "/tickets/all",
        MockReply::Fail(TransportError::status(401, "Unauthorized")),
    );
    session.bootstrap().await;
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let (loaded, refreshed) = tokio::join!(tickets.load(Filters::new()), async {
        // The admin request is in flight when the session switches to another user.
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.refresh().await
    });

    assert_eq!(loaded.unwrap_err().error_kind(), Some(ErrorKind::Auth));
    assert_eq!(refreshed.role(), Some(&Role::User));
    assert_eq!(session.get_state().role(), Some(&Role::User));
    assert_eq!(mock.calls_to(IDENTITY_PATH), 2);
}

// --- Descriptors & Cache ---

#[tokio::test]
async fn test_filters_and_cursor_are_sent_as_query() {
    let (mock, session) = signed_in("admin", MockTransport::new());
    mock.on(
        "/tickets/all",
        MockReply::Json(json!({"data": [], "next_cursor": "abc"})),
    );
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let collection = tickets
        .load(filters(&[("status", "open"), ("cursor", "p2")]))
        .await
        .unwrap();

    let call = mock
        .calls()
        .into_iter()
        .find(|call| call.path == "/tickets/all")
        .unwrap();
    assert!(call.query.contains(&("status".to_string(), "open".to_string())));
    assert!(call.query.contains(&("cursor".to_string(), "p2".to_string())));
    assert_eq!(call.query.len(), 2);
    assert_eq!(collection.paging.unwrap()["next_cursor"], "abc");
}

#[tokio::test]
async fn test_cached_result_is_reused_until_refetch() {
    let (mock, session) = signed_in("admin", MockTransport::new());
    mock.on("/tickets/all", MockReply::Json(json!([ticket(1, "open")])));
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    tickets.load(Filters::new()).await.unwrap();
    tickets.load(Filters::new()).await.unwrap();
    assert_eq!(mock.calls_to("/tickets/all"), 1);

    tickets.refetch().await.unwrap();
    assert_eq!(mock.calls_to("/tickets/all"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_identical_concurrent_loads_share_one_request() {
    let (mock, session) = signed_in(
        "admin",
        MockTransport::new().with_latency(Duration::from_millis(200)),
    );
    mock.on("/tickets/all", MockReply::Json(json!([ticket(1, "open")])));
    session.bootstrap().await;

    let cache = Arc::new(QueryCache::default());
    let list = ResourceHook::<Ticket>::new(
        ResourceSpec::tickets(),
        session.clone(),
        mock.clone() as TransportState,
        cache.clone(),
    );
    let badge = ResourceHook::<Ticket>::new(
        ResourceSpec::tickets(),
        session.clone(),
        mock.clone() as TransportState,
        cache,
    );

    let (a, b) = tokio::join!(list.load(Filters::new()), badge.load(Filters::new()));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(mock.calls_to("/tickets/all"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_result_is_never_published() {
    let (mock, session) = signed_in(
        "admin",
        MockTransport::new().with_latency(Duration::from_millis(200)),
    );
    mock.on("/tickets/all", MockReply::Json(json!([ticket(1, "open")])));
    session.bootstrap().await;
    let tickets = hook::<Ticket>(ResourceSpec::tickets(), &mock, &session);

    let (first, second, observed) = tokio::join!(
        tickets.load(filters(&[("status", "open")])),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tickets.load(filters(&[("status", "closed")])).await
        },
        async {
            // After the first response landed but before the second one.
            tokio::time::sleep(Duration::from_millis(225)).await;
            tickets.state()
        }
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    match observed {
        ResourceState::Loading { query } => {
            assert_eq!(query.filters.get("status").map(String::as_str), Some("closed"));
        }
        other => panic!("stale result was published: {:?}", other),
    }
    match tickets.state() {
        ResourceState::Ready { query, .. } => {
            assert_eq!(query.filters.get("status").map(String::as_str), Some("closed"));
        }
        other => panic!("expected ready state, got {:?}", other),
    }
}

// --- Reaction Loop ---

#[tokio::test]
async fn test_run_reloads_on_filter_change() {
    let (mock, session) = signed_in("user", MockTransport::new());
    mock.on("/tickets/mine", MockReply::Json(json!([ticket(1, "open")])));
    session.bootstrap().await;

    let tickets = Arc::new(hook::<Ticket>(ResourceSpec::tickets(), &mock, &session));
    let mut states = tickets.subscribe();
    let (filters_tx, filters_rx) = watch::channel(Filters::new());

    let runner = tickets.clone();
    let handle = tokio::spawn(async move { runner.run(filters_rx).await });

    states
        .wait_for(|state| matches!(state, ResourceState::Ready { .. }))
        .await
        .unwrap();

    filters_tx.send_replace(filters(&[("status", "closed")]));
    states
        .wait_for(|state| match state {
            ResourceState::Ready { query, .. } => query.filters.contains_key("status"),
            _ => false,
        })
        .await
        .unwrap();

    assert_eq!(mock.calls_to("/tickets/mine"), 2);
    drop(filters_tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_returns_to_idle_when_session_ends() {
    let (mock, session) = signed_in("user", MockTransport::new());
    mock.on("/tickets/mine", MockReply::Json(json!([ticket(1, "open")])));
    session.bootstrap().await;

    let tickets = Arc::new(hook::<Ticket>(ResourceSpec::tickets(), &mock, &session));
    let mut states = tickets.subscribe();
    let (filters_tx, filters_rx) = watch::channel(Filters::new());

    let runner = tickets.clone();
    let handle = tokio::spawn(async move { runner.run(filters_rx).await });
    states
        .wait_for(|state| matches!(state, ResourceState::Ready { .. }))
        .await
        .unwrap();

    session.invalidate();
    states
        .wait_for(|state| matches!(state, ResourceState::Idle))
        .await
        .unwrap();

    drop(filters_tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_refetches_from_new_role_endpoint() {
    let (mock, session) = signed_in(
        "admin",
        MockTransport::new().with_latency(Duration::from_millis(200)),
    );
    mock.on(IDENTITY_PATH, MockReply::Json(identity("user")));
    mock.on("/tickets/all", MockReply::Json(json!([ticket(1, "open")])));
    mock.on("/tickets/mine", MockReply::Json(json!([ticket(2, "closed")])));
    session.bootstrap().await;

    let cache = Arc::new(QueryCache::default());
    let tickets = Arc::new(ResourceHook::<Ticket>::new(
        ResourceSpec::tickets(),
        session.clone(),
        mock.clone() as TransportState,
        cache.clone(),
    ));
    let mut states = tickets.subscribe();
    let (filters_tx, filters_rx) = watch::channel(Filters::new());

    let runner = tickets.clone();
    let handle = tokio::spawn(async move { runner.run(filters_rx).await });

    // Switch users while the admin list is still in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let refreshed = session.refresh().await;
    assert_eq!(refreshed.role(), Some(&Role::User));

    states
        .wait_for(|state| match state {
            ResourceState::Ready { query, .. } => {
                assert_eq!(query.role, Role::User, "admin result was published");
                true
            }
            _ => false,
        })
        .await
        .unwrap();

    match tickets.state() {
        ResourceState::Ready { query, collection } => {
            assert_eq!(query.endpoint, "/tickets/mine");
            assert_eq!(collection.items[0].subject, "ticket 2");
        }
        other => panic!("expected ready state, got {:?}", other),
    }
    assert_eq!(mock.calls_to("/tickets/all"), 1);
    assert_eq!(mock.calls_to("/tickets/mine"), 1);
    // Only the user's entry survives the role change.
    assert_eq!(cache.len(), 1);

    drop(filters_tx);
    handle.await.unwrap();
}
