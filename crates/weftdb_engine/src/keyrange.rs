//! Key ranges over the ordered key domain.

use std::ops::Bound;
use weftdb_codec::Key;

/// A bounded, half-bounded, or unbounded interval over keys.
///
/// Used to restrict index scans. Endpoints may be inclusive or exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// The unbounded range containing every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// The range containing exactly one key.
    #[must_use]
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// A half-bounded range from `key` upward.
    #[must_use]
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
            upper: Bound::Unbounded,
        }
    }

    /// A half-bounded range from `key` downward.
    #[must_use]
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: if open {
                Bound::Excluded(key)
            } else {
                Bound::Included(key)
            },
        }
    }

    /// A bounded range between two keys.
    #[must_use]
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> Self {
        Self {
            lower: if lower_open {
                Bound::Excluded(lower)
            } else {
                Bound::Included(lower)
            },
            upper: if upper_open {
                Bound::Excluded(upper)
            } else {
                Bound::Included(upper)
            },
        }
    }

    /// Returns the lower endpoint.
    #[must_use]
    pub fn lower(&self) -> &Bound<Key> {
        &self.lower
    }

    /// Returns the upper endpoint.
    #[must_use]
    pub fn upper(&self) -> &Bound<Key> {
        &self.upper
    }

    /// Checks whether a key falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(k) => key >= k,
            Bound::Excluded(k) => key > k,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(k) => key <= k,
            Bound::Excluded(k) => key < k,
        };
        above_lower && below_upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contains_exactly_one_key() {
        let range = KeyRange::only(Key::Integer(5));
        assert!(range.contains(&Key::Integer(5)));
        assert!(!range.contains(&Key::Integer(4)));
        assert!(!range.contains(&Key::Integer(6)));
    }

    #[test]
    fn open_lower_bound_excludes_endpoint() {
        let range = KeyRange::lower_bound(Key::Integer(10), true);
        assert!(!range.contains(&Key::Integer(10)));
        assert!(range.contains(&Key::Integer(11)));
    }

    #[test]
    fn closed_bound_includes_endpoints() {
        let range = KeyRange::bound(Key::Integer(1), Key::Integer(3), false, false);
        assert!(range.contains(&Key::Integer(1)));
        assert!(range.contains(&Key::Integer(2)));
        assert!(range.contains(&Key::Integer(3)));
        assert!(!range.contains(&Key::Integer(4)));
    }

    #[test]
    fn unbounded_contains_everything() {
        let range = KeyRange::all();
        assert!(range.contains(&Key::Integer(i64::MIN)));
        assert!(range.contains(&Key::Text("z".into())));
    }

    #[test]
    fn mixed_variant_ordering_respected() {
        // Integers sort below text in the key domain.
        let range = KeyRange::upper_bound(Key::Text(String::new()), true);
        assert!(range.contains(&Key::Integer(i64::MAX)));
    }
}
