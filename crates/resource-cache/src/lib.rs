//! An in-process cache for asynchronously produced resources.
//!
//! See the [`caching`] module for how requests are deduplicated, retried and cancelled.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod logging;
pub mod utils;

#[cfg(test)]
mod test;

pub use caching::{
    AsyncResourceCache, CacheKey, InvalidOptions, InvalidRequest, RequestError, RequestOptions,
    RequestState, Subscription,
};
