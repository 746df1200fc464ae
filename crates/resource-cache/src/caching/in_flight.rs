use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use super::cache_error::Abandoned;
use super::{CacheKey, RequestState};

pub(super) type InFlightMap<T> = HashMap<CacheKey, Arc<InFlightRequest<T>>>;

/// The table of requests that are currently running, at most one per key.
///
/// The lock of this table also serializes the fresh-entry check of a request with the store of a
/// finished request, so that a request always sees either a fresh entry or an in-flight request.
pub(super) struct InFlightTable<T> {
    requests: Mutex<InFlightMap<T>>,
}

impl<T> Default for InFlightTable<T> {
    fn default() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> InFlightTable<T> {
    pub fn lock(&self) -> MutexGuard<'_, InFlightMap<T>> {
        // No code path panics while holding the lock, and the map stays consistent regardless.
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// A producer invocation, including its retries, shared by all its subscribers.
pub(super) struct InFlightRequest<T> {
    key: CacheKey,
    /// The 1-based number of the attempt currently running.
    attempt: AtomicU32,
    /// The number of attached subscriptions.
    ///
    /// Only modified while holding the [`InFlightTable`] lock.
    subscribers: AtomicUsize,
    /// Signalled when the last subscriber goes away.
    abandoned: Notify,
    /// Delivers the terminal state to all subscribers.
    state: watch::Sender<RequestState<T>>,
}

impl<T> InFlightRequest<T> {
    pub fn new(key: CacheKey) -> Arc<Self> {
        let (state, _) = watch::channel(RequestState::Loading);
        Arc::new(Self {
            key,
            attempt: AtomicU32::new(0),
            subscribers: AtomicUsize::new(0),
            abandoned: Notify::new(),
            state,
        })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Relaxed)
    }

    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Relaxed);
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Registers a new subscriber.
    ///
    /// Takes the locked table to prove the lock is held.
    pub fn attach(&self, _requests: &mut InFlightMap<T>) -> watch::Receiver<RequestState<T>> {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        self.state.subscribe()
    }

    /// Releases a subscriber, signalling the driver when it was the last one.
    pub fn detach(&self, table: &InFlightTable<T>) {
        let _requests = table.lock();
        let previous = self.subscribers.fetch_sub(1, Ordering::Relaxed);
        if previous == 1 {
            tracing::trace!(key = %self.key, "Last subscriber left");
            self.abandoned.notify_one();
        }
    }

    /// Whether this request is the one registered for its key in the table.
    fn is_registered(&self, requests: &InFlightMap<T>) -> bool {
        requests
            .get(&self.key)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), self))
    }

    /// Gives up the request if nobody is subscribed to it anymore.
    ///
    /// An abandoned request is removed from the table in the same critical section, so no new
    /// subscriber can attach to it afterwards. Returns `true` if the request was abandoned.
    pub fn try_abandon(&self, table: &InFlightTable<T>) -> bool {
        let mut requests = table.lock();
        if self.subscribers() > 0 {
            return false;
        }
        if self.is_registered(&requests) {
            requests.remove(&self.key);
        }
        true
    }

    /// Waits out a retry backoff, returning early if the request gets abandoned meanwhile.
    ///
    /// A subscriber that attaches before the abandonment is noticed revives the request, the wait
    /// then continues until its original deadline.
    pub async fn wait_backoff(
        &self,
        table: &InFlightTable<T>,
        backoff: Duration,
    ) -> Result<(), Abandoned> {
        let sleep = tokio::time::sleep_until(Instant::now() + backoff);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                _ = self.abandoned.notified() => {
                    if self.try_abandon(table) {
                        return Err(Abandoned);
                    }
                }
            }
        }
    }

    /// Removes the request from the table and publishes its terminal state.
    pub fn finish(&self, requests: &mut InFlightMap<T>, state: RequestState<T>) {
        debug_assert!(state.is_terminal());
        if self.is_registered(requests) {
            requests.remove(&self.key);
        }
        self.state.send_replace(state);
    }
}
