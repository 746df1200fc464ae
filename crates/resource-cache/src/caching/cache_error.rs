use std::time::Duration;

use thiserror::Error;

/// A request that was rejected before any producer was invoked.
///
/// This signals a programming error on the caller's side, retrying the same request will
/// fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    /// The key identifying the resource was empty.
    #[error("cache key must not be empty")]
    EmptyKey,
    /// The [`RequestOptions`](super::RequestOptions) are out of range.
    #[error("invalid request options: {0}")]
    InvalidOptions(#[from] InvalidOptions),
    /// A producer had to be spawned, but there is no tokio runtime to spawn it on.
    #[error("requests must be made from within a tokio runtime")]
    NoRuntime,
}

/// Out of range [`RequestOptions`](super::RequestOptions).
///
/// Negative values are unrepresentable, what remains are values too large to schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidOptions {
    /// The time-to-live cannot be added to the current time.
    #[error("ttl of {0:?} is out of range")]
    TtlOutOfRange(Duration),
    /// The longest retry backoff overflows.
    #[error("retry backoff of {base:?} times {max_retries} retries overflows")]
    BackoffOverflow { base: Duration, max_retries: u32 },
}

/// The terminal failure of a request, after all attempts have been made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (after {attempts} attempts)")]
pub struct RequestError {
    /// The error message of the last failed attempt.
    pub message: String,
    /// The total number of producer invocations that were made.
    pub attempts: u32,
}

impl RequestError {
    /// The driver of the request went away without reporting an outcome.
    ///
    /// This happens when the runtime shuts down or the producer panics.
    pub(super) fn dropped(attempts: u32) -> Self {
        Self {
            message: "request was dropped before completion".into(),
            attempts,
        }
    }
}

/// The request was given up because all of its subscribers went away.
///
/// This is never surfaced to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Abandoned;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_display() {
        let err = RequestError {
            message: "connection reset".into(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "connection reset (after 3 attempts)");
    }

    #[test]
    fn test_invalid_options_display() {
        let err = InvalidRequest::from(InvalidOptions::BackoffOverflow {
            base: Duration::MAX,
            max_retries: 2,
        });
        assert!(err.to_string().starts_with("invalid request options: retry backoff of"));
    }
}
