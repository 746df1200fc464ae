use std::time::Duration;

use futures::future::join_all;
use resource_cache::{RequestOptions, RequestState};

use crate::utils::{Fetches, cache};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_one_fetch() {
    let cache = cache("coalescing");
    let fetches = Fetches::default();

    let tasks = (0..32).map(|_| {
        let cache = cache.clone();
        let producer = fetches.producer("profile", Duration::from_millis(50));
        tokio::spawn(async move {
            let mut subscription = cache
                .request("users/42", producer, RequestOptions::default())
                .unwrap();
            subscription.wait().await
        })
    });
    let states = join_all(tasks).await;

    for state in states {
        assert_eq!(state.unwrap().value().map(String::as_str), Some("profile"));
    }
    assert_eq!(fetches.count(), 1);
    assert_eq!(cache.in_flight_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_keys() {
    let cache = cache("many-keys");
    let fetches = Fetches::default();

    let tasks = (0..64).map(|i| {
        let cache = cache.clone();
        let producer = fetches.producer("value", Duration::from_millis(10));
        tokio::spawn(async move {
            let key = format!("key/{}", i % 8);
            let mut subscription = cache
                .request(key, producer, RequestOptions::default())
                .unwrap();
            subscription.wait().await
        })
    });

    for state in join_all(tasks).await {
        assert!(matches!(state.unwrap(), RequestState::Success { .. }));
    }
    // each key is fetched once, later requests are served from memory or join
    assert_eq!(fetches.count(), 8);
    assert_eq!(cache.entry_count(), 8);
}

#[tokio::test]
async fn test_cache_handles_are_shared() {
    let cache = cache("handles");
    let other = cache.clone();
    let fetches = Fetches::default();

    let mut subscription = cache
        .request_default("users/1", fetches.producer("alice", Duration::ZERO))
        .unwrap();
    subscription.wait().await;

    assert_eq!(other.get("users/1"), Some("alice".to_owned()));
    other.invalidate("users/1");
    assert_eq!(cache.get("users/1"), None);

    let debug = format!("{cache:?}");
    assert!(debug.contains("AsyncResourceCache"));
    assert!(debug.contains("handles"));
}
