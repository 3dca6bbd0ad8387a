//! Captured route parameters.
//!
//! Parameters are stored as (name, value) pairs in a small vector so the
//! common cases (one or two captures) never touch the heap for the pair list.

use smallvec::SmallVec;

/// Maximum number of parameters stored inline.
const INLINE_PARAMS: usize = 4;

/// Name of the parameter a trailing `*` segment captures into.
pub const WILDCARD: &str = "wildcard";

/// Parameters captured by a route match.
///
/// # Example
///
/// ```rust
/// use quickserve_router::Params;
///
/// let mut params = Params::new();
/// params.push("id", "123");
///
/// assert_eq!(params.get("id"), Some("123"));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates a new empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter. A repeated name shadows nothing; `get` returns the first.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value captured by a `*` segment.
    #[must_use]
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the parameters in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = smallvec::IntoIter<[(String, String); INLINE_PARAMS]>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
