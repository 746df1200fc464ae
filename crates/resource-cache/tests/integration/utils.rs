use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use resource_cache::AsyncResourceCache;
use resource_cache::config::CacheConfig;
use tracing_subscriber::filter::EnvFilter;

/// Setup the test environment.
///
/// Initializes logs so that all console output is captured by the test runner.
pub fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("resource_cache=trace"))
        .with_target(false)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a cache with the default configuration and the given name.
pub fn cache(name: &str) -> AsyncResourceCache<String> {
    setup();
    AsyncResourceCache::new(CacheConfig {
        name: name.into(),
        ..Default::default()
    })
}

/// Counts how often a resource was fetched.
#[derive(Clone, Debug, Default)]
pub struct Fetches(Arc<AtomicUsize>);

impl Fetches {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// A producer that takes `latency` to return `value`.
    pub fn producer(
        &self,
        value: &'static str,
        latency: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static
    {
        let fetches = self.0.clone();
        move || -> BoxFuture<'static, Result<String, String>> {
            fetches.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(latency).await;
                Ok(value.to_owned())
            })
        }
    }
}
