use notedesk_core::{
    CollectionCache, Freshness, InMemoryNoteService, NoteDraft, RemoteError, RemoteOp,
};
use std::sync::Arc;
use std::time::Duration;

fn seeded_service(titles: &[&str]) -> Arc<InMemoryNoteService> {
    let service = Arc::new(InMemoryNoteService::new());
    for title in titles {
        service.seed(NoteDraft::new(*title, format!("body of {title}")));
    }
    service
}

#[tokio::test]
async fn concurrent_refreshes_share_one_remote_call() {
    let service = seeded_service(&["a", "b", "c"]);
    let cache = CollectionCache::new(service.clone(), None);

    let (first, second, third) = tokio::join!(
        cache.invalidate_and_refresh(),
        cache.invalidate_and_refresh(),
        cache.invalidate_and_refresh()
    );
    let (first, second, third) = (first.unwrap(), second.unwrap(), third.unwrap());

    assert_eq!(service.call_counts().list, 1);
    assert_eq!(first.generation, 1);
    assert_eq!(second.generation, first.generation);
    assert_eq!(third.generation, first.generation);
    assert!(Arc::ptr_eq(&first.records, &second.records));
    assert!(Arc::ptr_eq(&first.records, &third.records));
    assert_eq!(first.freshness, Freshness::Fresh);
}

#[tokio::test]
async fn sequential_refreshes_each_hit_the_service() {
    let service = seeded_service(&["only"]);
    let cache = CollectionCache::new(service.clone(), None);

    cache.invalidate_and_refresh().await.unwrap();
    let snapshot = cache.invalidate_and_refresh().await.unwrap();

    assert_eq!(service.call_counts().list, 2);
    assert_eq!(snapshot.generation, 2);
}

#[tokio::test]
async fn records_keep_service_order() {
    let service = seeded_service(&["zeta", "alpha", "mid"]);
    let cache = CollectionCache::new(service, None);

    let snapshot = cache.invalidate_and_refresh().await.unwrap();
    let titles: Vec<&str> = snapshot.records.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["zeta", "alpha", "mid"]);
}

#[tokio::test]
async fn loading_is_reported_while_refresh_is_in_flight() {
    let service = Arc::new(InMemoryNoteService::new().with_latency(Duration::from_millis(20)));
    let cache = CollectionCache::new(service, None);

    let observe = async {
        tokio::task::yield_now().await;
        cache.get().freshness
    };
    let (refreshed, observed) = tokio::join!(cache.invalidate_and_refresh(), observe);

    assert_eq!(observed, Freshness::Loading);
    assert_eq!(refreshed.unwrap().freshness, Freshness::Fresh);
}

#[tokio::test]
async fn failed_refresh_keeps_last_known_records() {
    let service = seeded_service(&["kept-1", "kept-2"]);
    let cache = CollectionCache::new(service.clone(), None);
    cache.invalidate_and_refresh().await.unwrap();

    service.fail_next(RemoteOp::List, "backend unavailable");
    let err = cache.invalidate_and_refresh().await.unwrap_err();
    assert_eq!(err, RemoteError::Injected("backend unavailable".to_string()));

    let snapshot = cache.get();
    assert_eq!(snapshot.freshness, Freshness::Failed);
    assert_eq!(snapshot.records.len(), 2);
    assert_eq!(snapshot.last_error, Some(err));
    assert_eq!(snapshot.generation, 1);

    let recovered = cache.invalidate_and_refresh().await.unwrap();
    assert_eq!(recovered.freshness, Freshness::Fresh);
    assert_eq!(recovered.last_error, None);
}

#[tokio::test]
async fn concurrent_waiters_all_observe_the_same_failure() {
    let service = seeded_service(&["x"]);
    let cache = CollectionCache::new(service.clone(), None);
    service.fail_next(RemoteOp::List, "boom");

    let (first, second) = tokio::join!(cache.invalidate_and_refresh(), cache.invalidate_and_refresh());

    assert_eq!(service.call_counts().list, 1);
    assert_eq!(first.unwrap_err(), second.unwrap_err());
    assert!(cache.get().records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn fresh_snapshot_goes_stale_after_configured_age() {
    let service = seeded_service(&["aging"]);
    let cache = CollectionCache::new(service, Some(Duration::from_secs(30)));

    cache.invalidate_and_refresh().await.unwrap();
    assert_eq!(cache.get().freshness, Freshness::Fresh);

    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(cache.get().freshness, Freshness::Fresh);

    tokio::time::advance(Duration::from_secs(1)).await;
    let snapshot = cache.get();
    assert_eq!(snapshot.freshness, Freshness::Stale);
    assert_eq!(snapshot.records.len(), 1);

    cache.invalidate_and_refresh().await.unwrap();
    assert_eq!(cache.get().freshness, Freshness::Fresh);
}
