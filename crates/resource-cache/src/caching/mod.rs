//! # Resource caching infrastructure
//!
//! This module contains the [`AsyncResourceCache`], which serves values that are expensive to
//! produce, such as the results of remote calls, from memory while they are fresh, and otherwise
//! produces them with a caller-supplied producer.
//!
//! ## Cache Layers
//!
//! A request goes through the following steps:
//! - First, it is validated. An empty key or out of range options fail right away with an
//!   [`InvalidRequest`], without ever invoking a producer.
//! - It then checks the in-memory store. A fresh entry is returned as a settled
//!   [`Subscription`] that is already [`Success`](RequestState::Success) with `from_cache` set.
//!   Stale entries are evicted by the read that finds them.
//! - On miss, it joins a request for the same key that is already in flight, if there is one.
//! - Otherwise, the producer is spawned on the tokio runtime, and its eventual success is stored.
//!
//! The check for a fresh entry and the registration of an in-flight request happen under one lock,
//! which is also held while a finished request stores its value. A request thus either sees the
//! value, or joins the request producing it.
//!
//! ## Request coalescing
//!
//! Only one producer runs per key at any time. All subscriptions to the same in-flight request
//! observe the same terminal state, and the producer of a joining request is never invoked.
//!
//! ## Retries
//!
//! A failing producer is retried up to [`RequestOptions::max_retries`] times, with a linear
//! backoff of `retry_backoff_base * n` after the `n`-th failed attempt. Subscribers stay
//! [`Loading`](RequestState::Loading) during the retries and only observe the final outcome. A
//! [`RequestError`] carries the message of the last failure and the number of attempts made.
//!
//! ## Cancellation
//!
//! [`Subscription::cancel`] and dropping a subscription only affect that one subscriber. Once the
//! last subscriber of a request is gone, the request is abandoned: it will not start another
//! attempt, and a pending backoff is cut short. A producer that is already running is not
//! interrupted, and its value is still stored when it succeeds.
//!
//! ### Metrics
//!
//! Each metric is tagged with a `cache` field that corresponds to the configured cache name:
//!
//! - `caches.access`: All valid requests.
//! - `caches.memory.hit`: Requests served from a fresh entry.
//! - `caches.in_flight.join`: Requests that joined an in-flight request.
//! - `caches.computation`: Producer invocations, including retries.
//! - `caches.computation.duration`: A timer for each producer invocation.
//! - `caches.computation.retry`: Failed attempts that are going to be retried.
//! - `caches.computation.failed`: Requests that failed after their last attempt.
//! - `caches.computation.abandoned`: Requests given up because nobody waited for them.
//! - `caches.invalidate` and `caches.clear`: Explicit removals.

mod cache_error;
mod cache_key;
mod in_flight;
mod memory;
mod options;
mod retry;
mod state;
mod store;
mod subscription;

pub use cache_error::{InvalidOptions, InvalidRequest, RequestError};
pub use cache_key::CacheKey;
pub use memory::AsyncResourceCache;
pub use options::RequestOptions;
pub use state::RequestState;
pub use subscription::Subscription;
