/// Guard that runs a closure when dropped.
pub struct DeferGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> DeferGuard<F> {
    /// Runs the deferred closure now instead of on drop.
    ///
    /// Running it more than once is a no-op.
    pub fn run(&mut self) {
        if let Some(f) = self.0.take() {
            f()
        }
    }

    /// Returns `true` if the closure has not run yet.
    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }
}

impl<F: FnOnce()> Drop for DeferGuard<F> {
    fn drop(&mut self) {
        self.run()
    }
}

impl<F: FnOnce()> std::fmt::Debug for DeferGuard<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeferGuard").field(&self.is_armed()).finish()
    }
}

/// Defers a closure, returning a `DeferGuard` that will
/// run it when dropped.
pub fn defer<F: FnOnce()>(f: F) -> DeferGuard<F> {
    DeferGuard(Some(f))
}
