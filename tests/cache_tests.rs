use portal_gate::{
    models::Role,
    resource::{
        Filters, ResourceError, ResourceKind, ResourceQuery, cache::QueryCache,
        envelope::RawCollection,
    },
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

fn query(kind: ResourceKind, endpoint: &str) -> ResourceQuery {
    ResourceQuery {
        kind,
        role: Role::Admin,
        endpoint: endpoint.to_string(),
        filters: Filters::new(),
        cursor: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_entries_expire_after_retention() {
    let cache = QueryCache::new(Duration::from_secs(60));
    let tickets = query(ResourceKind::Tickets, "/tickets/all");

    cache
        .get_or_fetch(&tickets, || async { Ok(Arc::new(RawCollection::default())) })
        .await
        .unwrap();
    assert_eq!(cache.len(), 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    cache.collect_garbage();
    assert_eq!(cache.len(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    cache.collect_garbage();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_failures_are_not_retained() {
    let cache = QueryCache::default();
    let tickets = query(ResourceKind::Tickets, "/tickets/all");

    let outcome = cache
        .get_or_fetch(&tickets, || async {
            Err(ResourceError::Unauthenticated {
                kind: ResourceKind::Tickets,
            })
        })
        .await;

    assert!(outcome.is_err());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_invalidate_kind_leaves_other_kinds() {
    let cache = QueryCache::default();
    let tickets = query(ResourceKind::Tickets, "/tickets/all");
    let requests = query(ResourceKind::Requests, "/requests/all");

    for q in [&tickets, &requests] {
        cache
            .get_or_fetch(q, || async { Ok(Arc::new(RawCollection::default())) })
            .await
            .unwrap();
    }

    cache.invalidate_kind(ResourceKind::Tickets);

    assert_eq!(cache.len(), 1);
    // The remaining entry is served without calling the fetch again.
    let refetched = AtomicBool::new(false);
    let cached = cache
        .get_or_fetch(&requests, || async {
            refetched.store(true, Ordering::SeqCst);
            Ok(Arc::new(RawCollection::default()))
        })
        .await;
    assert!(cached.is_ok());
    assert!(!refetched.load(Ordering::SeqCst));
}
