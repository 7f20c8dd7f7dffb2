//! Multi-version hashmap holding the committed writes of a block.
//!
//! For each key it stores one entry per writing transaction, so that a
//! transaction at index `i` reads the value of the highest committed writer
//! below `i`. Only committed write sets land here; speculative writes stay in
//! the owning task's record until the validation loop commits them.

use crate::storage::range_bounds;
use crate::types::{Incarnation, Key, ReadOrigin, TxnIndex, Value, Version, WriteSet};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// Entry in the version history of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedEntry {
    pub incarnation: Incarnation,
    /// `None` marks a deletion.
    pub value: Option<Value>,
}

/// Result of reading from the MVHashMap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// Value written by a lower transaction. `None` if it deleted the key.
    Versioned(Version, Option<Value>),
    /// No lower transaction wrote the key; read from base storage.
    Storage,
}

impl ReadResult {
    pub fn origin(&self) -> ReadOrigin {
        match self {
            ReadResult::Versioned(version, _) => ReadOrigin::Version(*version),
            ReadResult::Storage => ReadOrigin::Storage,
        }
    }
}

/// Multi-version hashmap.
///
/// Structure: Key -> BTreeMap<TxnIndex -> VersionedEntry>
///
/// The BTreeMap is keyed by TxnIndex so the latest version below a reader is
/// a single `range(..reader).next_back()`. A sorted key index backs range
/// scans.
pub struct MVHashMap {
    data: DashMap<Key, BTreeMap<TxnIndex, VersionedEntry>>,
    keys: RwLock<BTreeSet<Key>>,
}

impl MVHashMap {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            keys: RwLock::new(BTreeSet::new()),
        }
    }

    /// Reads the latest version of `key` written by a transaction with index
    /// below `reader_txn_idx`.
    pub fn read(&self, key: &[u8], reader_txn_idx: TxnIndex) -> ReadResult {
        if let Some(versions) = self.data.get(key) {
            if let Some((&writer_idx, entry)) = versions.range(..reader_txn_idx).next_back() {
                return ReadResult::Versioned(
                    Version::new(writer_idx, entry.incarnation),
                    entry.value.clone(),
                );
            }
        }
        ReadResult::Storage
    }

    /// Like [`MVHashMap::read`] but only resolves where the value comes from.
    pub fn origin(&self, key: &[u8], reader_txn_idx: TxnIndex) -> ReadOrigin {
        self.data
            .get(key)
            .and_then(|versions| {
                versions
                    .range(..reader_txn_idx)
                    .next_back()
                    .map(|(&writer_idx, entry)| {
                        ReadOrigin::Version(Version::new(writer_idx, entry.incarnation))
                    })
            })
            .unwrap_or(ReadOrigin::Storage)
    }

    /// Commits the write set of a transaction, making it visible to every
    /// higher index that reads afterwards.
    ///
    /// A transaction index is committed at most once per block, so each cell
    /// holds at most one entry per writer.
    pub fn apply_writeset(&self, txn_idx: TxnIndex, incarnation: Incarnation, writes: &WriteSet) {
        if writes.is_empty() {
            return;
        }

        let mut new_keys = Vec::new();
        for (key, value) in writes {
            let mut versions = self.data.entry(key.clone()).or_insert_with(|| {
                new_keys.push(key.clone());
                BTreeMap::new()
            });
            let previous = versions.insert(
                txn_idx,
                VersionedEntry {
                    incarnation,
                    value: value.clone(),
                },
            );
            debug_assert!(previous.is_none(), "transaction {txn_idx} committed twice");
        }

        if !new_keys.is_empty() {
            self.keys.write().extend(new_keys);
        }
    }

    /// Keys in `[start, end)` that have at least one committed write, in
    /// ascending order.
    pub fn keys_in_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<Key> {
        let Some(bounds) = range_bounds(start, end) else {
            return Vec::new();
        };
        self.keys.read().range::<[u8], _>(bounds).cloned().collect()
    }

    /// The value of the highest writer for every key, in key order.
    ///
    /// Called once the block has fully committed to produce the final write set.
    pub fn latest_writes(&self) -> Vec<(Key, Option<Value>)> {
        self.keys
            .read()
            .iter()
            .filter_map(|key| {
                self.data.get(key).and_then(|versions| {
                    versions
                        .values()
                        .next_back()
                        .map(|entry| (key.clone(), entry.value.clone()))
                })
            })
            .collect()
    }

    /// Number of keys with at least one committed write.
    pub fn num_keys(&self) -> usize {
        self.keys.read().len()
    }
}

impl Default for MVHashMap {
    fn default() -> Self {
        Self::new()
    }
}
