use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::Instant;

use super::in_flight::InFlightRequest;
use super::memory::Shared;
use super::store::CacheEntry;
use super::{RequestError, RequestOptions, RequestState};

/// A type-erased producer, whose errors are already rendered to their message.
pub(super) type BoxedProducer<T> =
    Box<dyn Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

/// Erases the type of `producer`, rendering its errors to their message.
pub(super) fn boxed_producer<T, P, F, E>(producer: P) -> BoxedProducer<T>
where
    P: Fn() -> F + Send + Sync + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + 'static,
{
    Box::new(move || {
        let future = producer();
        async move { future.await.map_err(|err| err.to_string()) }.boxed()
    })
}

/// Runs the attempts of one in-flight request and reports its outcome.
///
/// If the driver is dropped before reporting, for example because the producer panicked, its
/// subscribers are failed instead of waiting forever.
pub(super) struct RequestDriver<T: Clone + Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
    request: Arc<InFlightRequest<T>>,
    producer: BoxedProducer<T>,
    options: RequestOptions,
    reported: bool,
}

impl<T: Clone + Send + Sync + 'static> RequestDriver<T> {
    pub fn new(
        shared: Arc<Shared<T>>,
        request: Arc<InFlightRequest<T>>,
        producer: BoxedProducer<T>,
        options: RequestOptions,
    ) -> Self {
        Self {
            shared,
            request,
            producer,
            options,
            reported: false,
        }
    }

    fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Runs the producer until it succeeds, runs out of attempts, or nobody is interested anymore.
    ///
    /// Whether the request was abandoned is checked before every attempt, after every failure and
    /// while waiting out the backoff. A running producer is never interrupted.
    pub async fn run(mut self) {
        let max_attempts = self.options.max_attempts();
        let mut attempt = 0;

        loop {
            if self.request.try_abandon(&self.shared.in_flight) {
                return self.abandon();
            }

            attempt += 1;
            self.request.set_attempt(attempt);
            metric!(counter("caches.computation") += 1, "cache" => self.name());

            let start = Instant::now();
            let result = (self.producer)().await;
            metric!(timer("caches.computation.duration") = start.elapsed(), "cache" => self.name());

            let message = match result {
                Ok(value) => return self.succeed(value),
                Err(message) => message,
            };

            if attempt >= max_attempts {
                return self.fail(message, attempt);
            }

            if self.request.try_abandon(&self.shared.in_flight) {
                return self.abandon();
            }

            let backoff = self.options.backoff(attempt);
            tracing::debug!(
                cache = self.name(),
                key = %self.request.key(),
                attempt,
                error = %message,
                "Request failed, retrying in {:?}",
                backoff,
            );
            metric!(counter("caches.computation.retry") += 1, "cache" => self.name());

            if self
                .request
                .wait_backoff(&self.shared.in_flight, backoff)
                .await
                .is_err()
            {
                return self.abandon();
            }
        }
    }

    fn succeed(&mut self, value: T) {
        let key = self.request.key().clone();
        tracing::trace!(cache = self.name(), %key, "Request succeeded");

        let mut requests = self.shared.in_flight.lock();
        // the value is cached even if every subscriber is gone by now
        self.shared
            .store
            .insert(key, CacheEntry::new(value.clone(), self.options.ttl));
        self.request.finish(
            &mut requests,
            RequestState::Success {
                value,
                from_cache: false,
            },
        );
        self.reported = true;
    }

    fn fail(&mut self, message: String, attempts: u32) {
        tracing::warn!(
            cache = self.name(),
            key = %self.request.key(),
            attempts,
            error = %message,
            "Request failed",
        );
        metric!(counter("caches.computation.failed") += 1, "cache" => self.name());

        let error = RequestError { message, attempts };
        self.request
            .finish(&mut self.shared.in_flight.lock(), RequestState::Failed(error));
        self.reported = true;
    }

    /// The request was already removed from the table, there is nobody left to report to.
    fn abandon(&mut self) {
        tracing::debug!(
            cache = self.name(),
            key = %self.request.key(),
            attempt = self.request.attempt(),
            "Request abandoned",
        );
        metric!(counter("caches.computation.abandoned") += 1, "cache" => self.name());
        self.reported = true;
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for RequestDriver<T> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }

        tracing::error!(
            cache = self.name(),
            key = %self.request.key(),
            attempt = self.request.attempt(),
            "Request was dropped before completion",
        );
        let error = RequestError::dropped(self.request.attempt());
        self.request
            .finish(&mut self.shared.in_flight.lock(), RequestState::Failed(error));
    }
}
