use super::RequestError;

/// The observable state of a single logical request.
///
/// A request starts out [`Idle`](Self::Idle), is [`Loading`](Self::Loading) while its producer
/// runs (including all retries), and ends in exactly one of the terminal states
/// [`Success`](Self::Success), [`Failed`](Self::Failed) or [`Cancelled`](Self::Cancelled).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestState<T> {
    /// No request has been made yet.
    #[default]
    Idle,
    /// The producer is running or waiting to be retried.
    Loading,
    /// A value is available.
    Success {
        value: T,
        /// `true` if the value was served from a fresh cache entry without running the producer.
        from_cache: bool,
    },
    /// All attempts failed.
    Failed(RequestError),
    /// The subscriber lost interest before the request finished.
    Cancelled,
}

impl<T> RequestState<T> {
    /// Whether this state can not change anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Failed(_) | Self::Cancelled
        )
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns the value of a successful request.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the error of a failed request.
    pub fn error(&self) -> Option<&RequestError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the value was served from the cache.
    pub fn is_from_cache(&self) -> bool {
        matches!(
            self,
            Self::Success {
                from_cache: true,
                ..
            }
        )
    }

    /// Converts a terminal state into a `Result`.
    ///
    /// Returns `None` for states that have no outcome: idle, loading and cancelled requests.
    pub fn into_result(self) -> Option<Result<T, RequestError>> {
        match self {
            Self::Success { value, .. } => Some(Ok(value)),
            Self::Failed(err) => Some(Err(err)),
            Self::Idle | Self::Loading | Self::Cancelled => None,
        }
    }
}
