use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use super::in_flight::{InFlightRequest, InFlightTable};
use super::{CacheKey, RequestError, RequestState};
use crate::utils::defer::{DeferGuard, defer};

type DetachGuard = DeferGuard<Box<dyn FnOnce() + Send + Sync>>;

enum Inner<T> {
    /// The subscription has reached a state it will never leave.
    Settled(RequestState<T>),
    /// The subscription observes an in-flight request.
    Attached {
        receiver: watch::Receiver<RequestState<T>>,
        request: Arc<InFlightRequest<T>>,
        _detach: DetachGuard,
    },
}

/// One caller's interest in the outcome of a request.
///
/// Dropping a subscription has the same effect as [`cancel`](Self::cancel)ling it. A request is
/// only abandoned once all of its subscriptions are gone.
pub struct Subscription<T> {
    key: CacheKey,
    inner: Inner<T>,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    pub(super) fn settled(key: CacheKey, state: RequestState<T>) -> Self {
        Self {
            key,
            inner: Inner::Settled(state),
        }
    }

    /// Creates a subscription to `request`.
    ///
    /// The subscriber must already be counted via [`InFlightRequest::attach`].
    pub(super) fn attached(
        request: Arc<InFlightRequest<T>>,
        receiver: watch::Receiver<RequestState<T>>,
        table: Arc<InFlightTable<T>>,
    ) -> Self {
        let detach: DetachGuard = {
            let request = Arc::clone(&request);
            defer(Box::new(move || request.detach(&table)))
        };
        Self {
            key: request.key().clone(),
            inner: Inner::Attached {
                receiver,
                request,
                _detach: detach,
            },
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the current state of the request.
    pub fn state(&self) -> RequestState<T> {
        match &self.inner {
            Inner::Settled(state) => state.clone(),
            Inner::Attached { receiver, .. } => receiver.borrow().clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner, Inner::Settled(RequestState::Cancelled))
    }

    /// Waits for the request to reach a terminal state and returns it.
    pub async fn wait(&mut self) -> RequestState<T> {
        let state = match &mut self.inner {
            Inner::Settled(state) => return state.clone(),
            Inner::Attached {
                receiver, request, ..
            } => match receiver.wait_for(RequestState::is_terminal).await {
                Ok(state) => state.clone(),
                Err(_) => RequestState::Failed(RequestError::dropped(request.attempt())),
            },
        };

        // Settling drops the detach guard, this subscriber has no further interest.
        self.inner = Inner::Settled(state.clone());
        state
    }

    /// Gives up interest in the request.
    ///
    /// A subscription that is still loading becomes [`Cancelled`](RequestState::Cancelled) and
    /// will not observe any further state. The request itself keeps running as long as other
    /// subscribers are attached. Cancelling a finished subscription does nothing.
    pub fn cancel(&mut self) {
        let Inner::Attached { receiver, .. } = &self.inner else {
            return;
        };

        let current = receiver.borrow().clone();
        let state = if current.is_terminal() {
            current
        } else {
            tracing::trace!(key = %self.key, "Subscription cancelled");
            RequestState::Cancelled
        };
        self.inner = Inner::Settled(state);
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            Inner::Settled(RequestState::Idle) => "idle",
            Inner::Settled(RequestState::Loading) => "loading",
            Inner::Settled(RequestState::Success { .. }) => "success",
            Inner::Settled(RequestState::Failed(_)) => "failed",
            Inner::Settled(RequestState::Cancelled) => "cancelled",
            Inner::Attached { .. } => "attached",
        };
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("state", &state)
            .finish()
    }
}
