//! Base store interface.
//!
//! The executor reads the pre-block state through [`KvStore`] while the block
//! runs and flushes the final writes through it once every transaction has
//! committed.

use crate::types::{Key, Value};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Committed key/value state underneath the multi-version store.
pub trait KvStore: Sync {
    fn get(&self, key: &[u8]) -> Option<Value>;

    /// Returns the entries in `[start, end)` in ascending key order.
    /// A `None` bound is unbounded.
    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<(Key, Value)>;

    fn set(&mut self, key: Key, value: Value);

    fn delete(&mut self, key: &[u8]);
}

/// Returns true if `key` lies in the half-open range `[start, end)`.
pub fn in_range(key: &[u8], start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
    start.map_or(true, |s| key >= s) && end.map_or(true, |e| key < e)
}

/// Converts `[start, end)` into bounds for `BTreeMap::range` and
/// `BTreeSet::range`. Returns `None` for an empty or inverted range, which
/// would make those panic.
pub(crate) fn range_bounds<'a>(
    start: Option<&'a [u8]>,
    end: Option<&'a [u8]>,
) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return None;
        }
    }
    let lower = start.map_or(Bound::Unbounded, Bound::Included);
    let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
    Some((lower, upper))
}

/// In-memory ordered store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    data: BTreeMap<Key, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.data.iter()
    }
}

impl FromIterator<(Key, Value)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<(Key, Value)> {
        let Some(bounds) = range_bounds(start, end) else {
            return Vec::new();
        };
        self.data
            .range::<[u8], _>(bounds)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn set(&mut self, key: Key, value: Value) {
        self.data.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.data.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        let store: MemoryStore = [b"a", b"b", b"c", b"d"]
            .into_iter()
            .map(|k| (k.to_vec(), k.to_vec()))
            .collect();

        let keys: Vec<_> = store
            .range(Some(b"b".as_slice()), Some(b"d".as_slice()))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);

        assert_eq!(store.range(None, None).len(), 4);
        assert!(store.range(Some(b"c".as_slice()), Some(b"a".as_slice())).is_empty());
    }

    #[test]
    fn test_set_and_delete() {
        let mut store = MemoryStore::new();
        store.set(b"k".to_vec(), b"v".to_vec());
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        store.delete(b"k");
        assert!(store.get(b"k").is_none());
        assert!(store.is_empty());
    }
}
