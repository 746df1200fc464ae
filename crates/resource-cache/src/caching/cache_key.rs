use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use super::InvalidRequest;

/// The opaque, non-empty identifier of a cached resource.
///
/// Keys are cheap to clone, they share the underlying string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Creates a new [`CacheKey`], rejecting empty identifiers.
    pub fn new(key: impl Into<Arc<str>>) -> Result<Self, InvalidRequest> {
        let key = key.into();
        if key.is_empty() {
            return Err(InvalidRequest::EmptyKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = InvalidRequest;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = InvalidRequest;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
