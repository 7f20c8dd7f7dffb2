//! Per-transaction view over the multi-version store.
//!
//! A [`TxnView`] is built for every execution attempt. Reads resolve, in
//! order, against the attempt's own writes, the committed writes of lower
//! indices in the [`MVHashMap`], and finally the base store. Every read that
//! reaches shared state is recorded so the validation loop can later check it
//! is still what sequential execution would have observed.

use crate::mvhashmap::{MVHashMap, ReadResult};
use crate::storage::{in_range, KvStore};
use crate::types::{
    BlockContext, ExecutionRecord, Incarnation, Key, RangeRead, ReadOrigin, ReadSet, TxnIndex,
    TxnOutcome, Value, WriteSet,
};
use std::collections::BTreeMap;

pub struct TxnView<'a> {
    txn_idx: TxnIndex,
    incarnation: Incarnation,
    block: &'a BlockContext,
    mv: &'a MVHashMap,
    base: &'a dyn KvStore,
    reads: ReadSet,
    ranges: Vec<RangeRead>,
    writes: WriteSet,
}

impl<'a> TxnView<'a> {
    pub fn new(
        txn_idx: TxnIndex,
        incarnation: Incarnation,
        block: &'a BlockContext,
        mv: &'a MVHashMap,
        base: &'a dyn KvStore,
    ) -> Self {
        Self {
            txn_idx,
            incarnation,
            block,
            mv,
            base,
            reads: ReadSet::new(),
            ranges: Vec::new(),
            writes: WriteSet::new(),
        }
    }

    pub fn txn_idx(&self) -> TxnIndex {
        self.txn_idx
    }

    pub fn incarnation(&self) -> Incarnation {
        self.incarnation
    }

    pub fn block(&self) -> &BlockContext {
        self.block
    }

    /// Reads `key` as of this transaction's position in the block.
    pub fn get(&mut self, key: &[u8]) -> Option<Value> {
        if let Some(value) = self.writes.get(key) {
            return value.clone();
        }
        self.read_shared(key)
    }

    pub fn has(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Buffers a write. Not visible to other transactions until commit.
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        self.writes.insert(key.into(), Some(value.into()));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    /// Returns every live entry in `[start, end)`, in ascending key order,
    /// including this transaction's own pending writes.
    ///
    /// The set of keys visible from shared state is recorded so that inserts
    /// or deletes by lower transactions inside the range are detected as
    /// conflicts.
    pub fn range(&mut self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<(Key, Value)> {
        let (observed, shared) = visible_range(self.mv, self.base, self.txn_idx, start, end);

        for (key, origin) in &observed {
            self.reads.entry(key.clone()).or_insert(*origin);
        }
        self.ranges.push(RangeRead {
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
            observed,
        });

        let mut merged: BTreeMap<Key, Value> = shared.into_iter().collect();
        for (key, value) in self.writes.iter().filter(|(k, _)| in_range(k, start, end)) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    pub fn read_set(&self) -> &ReadSet {
        &self.reads
    }

    pub fn write_set(&self) -> &WriteSet {
        &self.writes
    }

    /// Consumes the view into the record stored in the task slot.
    ///
    /// Writes are dropped for anything but a successful outcome; the reads are
    /// always kept since the outcome itself depends on them.
    pub fn into_record(self, outcome: TxnOutcome) -> ExecutionRecord {
        let writes = if outcome.is_success() {
            self.writes
        } else {
            WriteSet::new()
        };
        ExecutionRecord {
            incarnation: self.incarnation,
            reads: self.reads,
            ranges: self.ranges,
            writes,
            outcome,
        }
    }

    fn read_shared(&mut self, key: &[u8]) -> Option<Value> {
        let result = self.mv.read(key, self.txn_idx);
        let origin = result.origin();

        // Committed state does not change while a wave executes, so a repeated
        // read always resolves to the origin recorded first.
        self.reads.entry(key.to_vec()).or_insert(origin);

        match result {
            ReadResult::Versioned(_, value) => value,
            ReadResult::Storage => self.base.get(key),
        }
    }
}

/// Resolves the live shared entries in `[start, end)` visible to `txn_idx`.
///
/// Returns the observed keys with their origins alongside the key/value pairs.
/// Shared by execution and validation so both derive the range identically.
pub(crate) fn visible_range(
    mv: &MVHashMap,
    base: &dyn KvStore,
    txn_idx: TxnIndex,
    start: Option<&[u8]>,
    end: Option<&[u8]>,
) -> (Vec<(Key, ReadOrigin)>, Vec<(Key, Value)>) {
    let mut candidates: BTreeMap<Key, Option<Value>> = base
        .range(start, end)
        .into_iter()
        .map(|(k, v)| (k, Some(v)))
        .collect();
    for key in mv.keys_in_range(start, end) {
        candidates.entry(key).or_insert(None);
    }

    let mut observed = Vec::new();
    let mut entries = Vec::new();
    for (key, base_value) in candidates {
        let (origin, value) = match mv.read(&key, txn_idx) {
            ReadResult::Versioned(version, value) => (ReadOrigin::Version(version), value),
            ReadResult::Storage => (ReadOrigin::Storage, base_value),
        };
        if let Some(value) = value {
            observed.push((key.clone(), origin));
            entries.push((key, value));
        }
    }
    (observed, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{TxnOutput, Version};

    fn base() -> MemoryStore {
        [("a", "1"), ("b", "2"), ("d", "4")]
            .into_iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    fn single(key: &str, value: Option<&str>) -> WriteSet {
        let mut ws = WriteSet::new();
        ws.insert(key.as_bytes().to_vec(), value.map(|v| v.as_bytes().to_vec()));
        ws
    }

    #[test]
    fn test_read_falls_through_to_storage() {
        let store = base();
        let mv = MVHashMap::new();
        let block = BlockContext::default();
        let mut view = TxnView::new(3, 0, &block, &mv, &store);

        assert_eq!(view.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(view.get(b"z"), None);
        assert_eq!(view.read_set().get(b"a".as_slice()), Some(&ReadOrigin::Storage));
        assert_eq!(view.read_set().get(b"z".as_slice()), Some(&ReadOrigin::Storage));
    }

    #[test]
    fn test_read_sees_lower_commit_only() {
        let store = base();
        let mv = MVHashMap::new();
        mv.apply_writeset(1, 2, &single("a", Some("10")));
        mv.apply_writeset(5, 0, &single("a", Some("50")));
        let block = BlockContext::default();

        let mut view = TxnView::new(3, 0, &block, &mv, &store);
        assert_eq!(view.get(b"a"), Some(b"10".to_vec()));
        assert_eq!(
            view.read_set().get(b"a".as_slice()),
            Some(&ReadOrigin::Version(Version::new(1, 2)))
        );
    }

    #[test]
    fn test_own_writes_are_not_recorded_as_reads() {
        let store = base();
        let mv = MVHashMap::new();
        let block = BlockContext::default();
        let mut view = TxnView::new(0, 0, &block, &mv, &store);

        view.set(b"k".to_vec(), b"v".to_vec());
        assert_eq!(view.get(b"k"), Some(b"v".to_vec()));
        view.delete(b"a");
        assert!(!view.has(b"a"));
        assert!(view.read_set().is_empty());
        assert_eq!(view.write_set().len(), 2);
    }

    #[test]
    fn test_range_merges_shared_and_own_writes() {
        let store = base();
        let mv = MVHashMap::new();
        mv.apply_writeset(0, 0, &single("c", Some("3")));
        mv.apply_writeset(1, 0, &single("b", None));
        let block = BlockContext::default();

        let mut view = TxnView::new(2, 0, &block, &mv, &store);
        view.set(b"bb".to_vec(), b"own".to_vec());
        view.delete(b"d");

        let keys: Vec<_> = view
            .range(None, None)
            .into_iter()
            .map(|(k, _)| String::from_utf8(k).unwrap())
            .collect();
        assert_eq!(keys, vec!["a", "bb", "c"]);

        let record = view.into_record(TxnOutcome::Success(TxnOutput::default()));
        assert_eq!(record.ranges.len(), 1);
        let observed: Vec<_> = record.ranges[0].observed.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(observed, vec![b"a".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_failed_outcome_drops_writes_keeps_reads() {
        let store = base();
        let mv = MVHashMap::new();
        let block = BlockContext::default();
        let mut view = TxnView::new(0, 0, &block, &mv, &store);

        let _ = view.get(b"a");
        view.set(b"a".to_vec(), b"changed".to_vec());
        let record = view.into_record(TxnOutcome::Fault("boom".to_string()));

        assert!(record.writes.is_empty());
        assert_eq!(record.reads.len(), 1);
    }
}
