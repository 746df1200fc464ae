use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::in_flight::{InFlightRequest, InFlightTable};
use super::retry::{RequestDriver, boxed_producer};
use super::store::CacheStore;
use super::{CacheKey, InvalidRequest, RequestOptions, RequestState, Subscription};
use crate::config::CacheConfig;

/// State shared between all handles of a cache and its running requests.
pub(super) struct Shared<T> {
    pub config: CacheConfig,
    pub store: CacheStore<T>,
    pub in_flight: Arc<InFlightTable<T>>,
}

/// An in-memory cache of asynchronously produced values.
///
/// Transparently serves fresh values from the cache, and otherwise runs the given producer,
/// retrying failures with a linear backoff and caching the eventual success.
///
/// Internally deduplicates concurrent requests for the same key, so that only one producer runs
/// per key at any time.
pub struct AsyncResourceCache<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for AsyncResourceCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResourceCache")
            .field("config", &self.shared.config)
            .field("in-memory items", &self.shared.store.entry_count())
            .field("running requests", &self.shared.in_flight.len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for AsyncResourceCache<T> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<T: Clone + Send + Sync + 'static> AsyncResourceCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        let store = CacheStore::new(&config.name, config.in_memory_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                store,
                in_flight: Default::default(),
            }),
        }
    }

    /// The name used to tag logs and metrics of this cache.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The options configured as defaults for this cache.
    pub fn options(&self) -> RequestOptions {
        self.shared.config.request_options()
    }

    /// Requests the value for `key`, producing it with `producer` if necessary.
    ///
    /// A fresh cache entry is returned right away, without invoking the producer, unless
    /// [`force_refresh`](RequestOptions::force_refresh) is set. If a request for the same key is
    /// already in flight, the returned subscription joins it. Otherwise the producer is invoked
    /// on a spawned task and retried on failure.
    ///
    /// # Errors
    ///
    /// Fails synchronously with [`InvalidRequest`] for an empty key or out of range options,
    /// before any producer is invoked. A request that would have to invoke the producer fails with
    /// [`InvalidRequest::NoRuntime`] when called outside of a tokio runtime. Failures of the
    /// producer itself are never returned here, they are reported through the [`Subscription`].
    pub fn request<P, F, E>(
        &self,
        key: impl AsRef<str>,
        producer: P,
        options: RequestOptions,
    ) -> Result<Subscription<T>, InvalidRequest>
    where
        P: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let key = CacheKey::new(key.as_ref())?;
        options.validate()?;

        let name = self.name();
        metric!(counter("caches.access") += 1, "cache" => name);

        let mut requests = self.shared.in_flight.lock();

        if !options.force_refresh {
            if let Some(value) = self.shared.store.get_fresh(key.as_str()) {
                drop(requests);
                metric!(counter("caches.memory.hit") += 1, "cache" => name);
                let state = RequestState::Success {
                    value,
                    from_cache: true,
                };
                return Ok(Subscription::settled(key, state));
            }
        }

        if let Some(request) = requests.get(&key).cloned() {
            let receiver = request.attach(&mut requests);
            drop(requests);

            tracing::trace!(cache = name, %key, "Joining in-flight request");
            metric!(counter("caches.in_flight.join") += 1, "cache" => name);
            return Ok(Subscription::attached(
                request,
                receiver,
                Arc::clone(&self.shared.in_flight),
            ));
        }

        let runtime = Handle::try_current().map_err(|_| InvalidRequest::NoRuntime)?;
        let request = InFlightRequest::new(key.clone());
        let receiver = request.attach(&mut requests);
        requests.insert(key.clone(), Arc::clone(&request));
        drop(requests);

        tracing::trace!(cache = name, %key, "Spawning deduplicated computation");

        let driver = RequestDriver::new(
            Arc::clone(&self.shared),
            Arc::clone(&request),
            boxed_producer(producer),
            options,
        );
        runtime.spawn(driver.run());

        Ok(Subscription::attached(
            request,
            receiver,
            Arc::clone(&self.shared.in_flight),
        ))
    }

    /// Requests the value for `key` with the default options of this cache.
    pub fn request_default<P, F, E>(
        &self,
        key: impl AsRef<str>,
        producer: P,
    ) -> Result<Subscription<T>, InvalidRequest>
    where
        P: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        self.request(key, producer, self.options())
    }

    /// Returns the value for `key` if a fresh entry exists, without producing it.
    pub fn get(&self, key: impl AsRef<str>) -> Option<T> {
        let _requests = self.shared.in_flight.lock();
        self.shared.store.get_fresh(key.as_ref())
    }

    /// Removes the entry for `key`.
    ///
    /// A request for `key` that is in flight is not affected and may store its value afterwards.
    pub fn invalidate(&self, key: impl AsRef<str>) {
        let key = key.as_ref();
        tracing::trace!(cache = self.name(), key, "Invalidating entry");
        metric!(counter("caches.invalidate") += 1, "cache" => self.name());
        self.shared.store.invalidate(key);
    }

    /// Removes all entries, leaving in-flight requests untouched.
    pub fn clear(&self) {
        tracing::debug!(cache = self.name(), "Clearing cache");
        metric!(counter("caches.clear") += 1, "cache" => self.name());
        self.shared.store.clear();
    }

    /// The number of stored entries, including stale ones that were not read yet.
    pub fn entry_count(&self) -> u64 {
        self.shared.store.entry_count()
    }

    /// The number of requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }
}
