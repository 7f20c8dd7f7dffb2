//! Conflict detection and the in-order validation & commit pass.

use crate::errors::BlockExecutionResult;
use crate::mvhashmap::MVHashMap;
use crate::scheduler::Scheduler;
use crate::storage::KvStore;
use crate::types::{ExecutionRecord, Key, TxnIndex, TxnOutcome};
use crate::view::visible_range;
use tracing::{trace, warn};

/// Why a record failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// A point read now resolves to a different writer.
    StaleRead(Key),
    /// The live keys of a scanned range changed.
    StaleRange {
        start: Option<Key>,
        end: Option<Key>,
    },
}

/// Checks that every read of `record` still resolves to the writer it
/// observed, given the writes committed so far.
///
/// Validation always re-derives the current state rather than trusting an
/// earlier verdict.
pub fn validate_record(
    record: &ExecutionRecord,
    txn_idx: TxnIndex,
    mv: &MVHashMap,
    base: &dyn KvStore,
) -> Result<(), Conflict> {
    for (key, observed) in &record.reads {
        if mv.origin(key, txn_idx) != *observed {
            return Err(Conflict::StaleRead(key.clone()));
        }
    }

    for range in &record.ranges {
        let (observed, _) = visible_range(
            mv,
            base,
            txn_idx,
            range.start.as_deref(),
            range.end.as_deref(),
        );
        if observed != range.observed {
            return Err(Conflict::StaleRange {
                start: range.start.clone(),
                end: range.end.clone(),
            });
        }
    }

    Ok(())
}

/// Summary of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub committed: usize,
    pub aborted: usize,
    /// Valid records held back because a lower index is not committed.
    pub deferred: usize,
}

/// Validates every uncommitted index in ascending order.
///
/// A valid record commits only while every lower index is committed; once an
/// index aborts or has no record, later valid records are kept and validated
/// again in the next pass. Conflicted records are discarded and their index
/// is rescheduled with the next incarnation.
pub fn run_validation_pass(
    scheduler: &Scheduler,
    mv: &MVHashMap,
    base: &dyn KvStore,
) -> BlockExecutionResult<PassSummary> {
    let mut summary = PassSummary::default();
    let mut prefix_intact = true;

    for txn_idx in scheduler.committed_prefix()..scheduler.num_txns() {
        let verdict = scheduler.with_record(txn_idx, |record| {
            validate_record(record, txn_idx, mv, base).map(|()| fault_message(record))
        });

        match verdict {
            None => prefix_intact = false,
            Some(Ok(fault)) => {
                if prefix_intact && scheduler.commit(txn_idx, mv) {
                    if let Some(message) = fault {
                        warn!(txn_idx, %message, "Committed faulted transaction");
                    }
                    summary.committed += 1;
                } else {
                    prefix_intact = false;
                    summary.deferred += 1;
                }
            }
            Some(Err(conflict)) => {
                let incarnation = scheduler.abort(txn_idx)?;
                trace!(txn_idx, incarnation, ?conflict, "Aborted transaction");
                prefix_intact = false;
                summary.aborted += 1;
            }
        }
    }

    Ok(summary)
}

fn fault_message(record: &ExecutionRecord) -> Option<String> {
    match &record.outcome {
        TxnOutcome::Fault(message) => Some(message.clone()),
        _ => None,
    }
}
