//! Core types for OCC block execution.

use crate::errors::ApplicationError;
use std::collections::BTreeMap;
use std::fmt;

/// Transaction index in the block (0-based).
pub type TxnIndex = usize;

/// Incarnation number (how many times a transaction has been re-executed).
pub type Incarnation = usize;

/// Storage key.
pub type Key = Vec<u8>;

/// Storage value.
pub type Value = Vec<u8>;

/// Version identifier for a transaction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub txn_idx: TxnIndex,
    pub incarnation: Incarnation,
}

impl Version {
    pub fn new(txn_idx: TxnIndex, incarnation: Incarnation) -> Self {
        Self { txn_idx, incarnation }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.txn_idx, self.incarnation)
    }
}

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOrigin {
    /// No committed write below the reader; served by the base store.
    Storage,
    /// Served by the committed write of an earlier transaction.
    Version(Version),
}

/// Keys a transaction observed, with the writer each observation came from.
pub type ReadSet = BTreeMap<Key, ReadOrigin>;

/// Buffered writes of a transaction. `None` deletes the key.
pub type WriteSet = BTreeMap<Key, Option<Value>>;

/// A range scan performed by a transaction.
///
/// `observed` holds the keys in `[start, end)` that were visible from shared
/// state (own writes excluded) at execution time, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRead {
    pub start: Option<Key>,
    pub end: Option<Key>,
    pub observed: Vec<(Key, ReadOrigin)>,
}

/// Information about the block being executed, handed to transaction logic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockContext {
    pub height: u64,
    /// Block time in unix seconds.
    pub time: u64,
    pub chain_id: u64,
}

/// An event emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }
}

/// Output of a successful transaction execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnOutput {
    pub gas_used: u64,
    pub events: Vec<Event>,
    pub data: Vec<u8>,
}

/// Final result of a transaction, as recorded in the block result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOutcome {
    /// Transaction executed successfully and its writes were committed.
    Success(TxnOutput),
    /// Transaction logic rejected the transaction; no writes were committed.
    Failed(ApplicationError),
    /// Transaction logic panicked; no writes were committed.
    Fault(String),
}

impl TxnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TxnOutcome::Success(_))
    }

    pub fn gas_used(&self) -> u64 {
        match self {
            TxnOutcome::Success(output) => output.gas_used,
            TxnOutcome::Failed(err) => err.gas_used,
            TxnOutcome::Fault(_) => 0,
        }
    }

    pub fn events(&self) -> &[Event] {
        match self {
            TxnOutcome::Success(output) => &output.events,
            _ => &[],
        }
    }
}

/// Everything one execution attempt produced.
///
/// Owned by the task slot of its index until it is committed or discarded.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub incarnation: Incarnation,
    pub reads: ReadSet,
    pub ranges: Vec<RangeRead>,
    pub writes: WriteSet,
    pub outcome: TxnOutcome,
}

/// Status of a transaction in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Waiting to be picked up by a worker.
    Pending,
    /// Currently executing.
    Executing(Incarnation),
    /// Finished execution, waiting for validation.
    Executed(Incarnation),
    /// Failed validation; will become pending in the next wave.
    Aborted(Incarnation),
    /// Committed to the multi-version store. Terminal.
    Committed,
}
