use std::time::Duration;

use resource_cache::{RequestOptions, RequestState};

use crate::utils::{Fetches, cache};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_waiter_does_not_affect_others() {
    let cache = cache("cancellation");
    let fetches = Fetches::default();
    let producer = || fetches.producer("report", Duration::from_millis(100));

    let mut first = cache
        .request("reports/1", producer(), RequestOptions::default())
        .unwrap();
    let mut second = cache
        .request("reports/1", producer(), RequestOptions::default())
        .unwrap();

    // the first waiter gives up after a short timeout
    let timed_out = tokio::time::timeout(Duration::from_millis(10), first.wait()).await;
    assert!(timed_out.is_err());
    drop(first);

    let state = second.wait().await;
    assert_eq!(state.value().map(String::as_str), Some("report"));
    assert!(!state.is_from_cache());
    assert_eq!(fetches.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_fetch_populates_cache() {
    let cache = cache("abandoned");
    let fetches = Fetches::default();

    let subscription = cache
        .request(
            "reports/1",
            fetches.producer("report", Duration::from_millis(50)),
            RequestOptions::default(),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(subscription);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.in_flight_count(), 0);

    let subscription = cache
        .request(
            "reports/1",
            fetches.producer("other", Duration::ZERO),
            RequestOptions::default(),
        )
        .unwrap();
    assert_eq!(
        subscription.state(),
        RequestState::Success {
            value: "report".to_owned(),
            from_cache: true,
        }
    );
    assert_eq!(fetches.count(), 1);
}
