//! Helpers for testing the resource cache.
//!
//! In every test, call [`setup`]. This will set up the logger so that all console output
//! is captured by the test runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `resource_cache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("resource_cache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A producer for tests that counts its invocations.
///
/// Every invocation sleeps for `latency` and then takes the next outcome from `outcomes`.
/// Once the outcomes are exhausted, the last one is repeated.
#[derive(Clone, Debug)]
pub struct CountingProducer {
    calls: Arc<AtomicUsize>,
    latency: Duration,
    outcomes: Arc<[Result<&'static str, &'static str>]>,
}

impl CountingProducer {
    /// A producer that always yields `value`.
    pub fn ok(value: &'static str) -> Self {
        Self::with_outcomes([Ok(value)])
    }

    /// A producer that always fails with `message`.
    pub fn failing(message: &'static str) -> Self {
        Self::with_outcomes([Err(message)])
    }

    pub fn with_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, &'static str>>,
    {
        Self {
            calls: Default::default(),
            latency: Duration::from_millis(100),
            outcomes: outcomes.into_iter().collect(),
        }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The number of times the producer was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Turns this into a closure accepted by [`AsyncResourceCache::request`](crate::AsyncResourceCache::request).
    pub fn producer(
        &self,
    ) -> impl Fn() -> BoxFuture<'static, Result<String, String>>
    + Send
    + Sync
    + 'static {
        let this = self.clone();
        move || -> BoxFuture<'static, Result<String, String>> {
            let call = this.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = this
                .outcomes
                .get(call)
                .or_else(|| this.outcomes.last())
                .copied()
                .unwrap_or(Err("no outcome"));
            let latency = this.latency;
            Box::pin(async move {
                tokio::time::sleep(latency).await;
                outcome.map(str::to_owned).map_err(str::to_owned)
            })
        }
    }
}
