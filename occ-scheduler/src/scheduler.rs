//! Scheduler for coordinating waves of parallel execution.
//!
//! Each transaction index owns a task slot holding its status, incarnation and
//! the record of its latest execution attempt. A wave enqueues every pending
//! index; workers drain the queue and store their records in the slots. The
//! validation loop then commits or aborts the slots in index order.

use crate::errors::{BlockExecutionError, BlockExecutionResult};
use crate::mvhashmap::MVHashMap;
use crate::types::{ExecutionRecord, ExecutionStatus, Incarnation, TxnIndex, TxnOutcome};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Task for a worker thread to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Execute a transaction at a specific incarnation.
    Execute(TxnIndex, Incarnation),
    /// The current wave has no more work.
    Done,
}

#[derive(Debug)]
struct TaskState {
    status: ExecutionStatus,
    incarnation: Incarnation,
    record: Option<ExecutionRecord>,
    outcome: Option<TxnOutcome>,
}

impl TaskState {
    fn new() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            incarnation: 0,
            record: None,
            outcome: None,
        }
    }
}

/// Scheduler state for one block.
pub struct Scheduler {
    /// Number of transactions in the block.
    num_txns: usize,

    /// Per-index task slots.
    tasks: Vec<Mutex<TaskState>>,

    /// Indices to execute in the current wave.
    ready_queue: SegQueue<(TxnIndex, Incarnation)>,

    /// Length of the committed prefix; every index below it is committed.
    committed_idx: AtomicUsize,

    /// Number of execution attempts handed out, including re-executions.
    executions: AtomicUsize,

    max_incarnations: usize,
}

impl Scheduler {
    /// Creates a new scheduler for a block of transactions.
    pub fn new(num_txns: usize, max_incarnations: usize) -> Self {
        Self {
            num_txns,
            tasks: (0..num_txns).map(|_| Mutex::new(TaskState::new())).collect(),
            ready_queue: SegQueue::new(),
            committed_idx: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
            max_incarnations,
        }
    }

    pub fn num_txns(&self) -> usize {
        self.num_txns
    }

    /// Enqueues every uncommitted index that needs (re-)execution, in
    /// ascending order. Returns the number of queued indices.
    pub fn begin_wave(&self) -> usize {
        let mut queued = 0;
        for idx in self.committed_prefix()..self.num_txns {
            let mut task = self.tasks[idx].lock();
            match task.status {
                ExecutionStatus::Pending | ExecutionStatus::Aborted(_) => {
                    task.status = ExecutionStatus::Pending;
                    self.ready_queue.push((idx, task.incarnation));
                    queued += 1;
                }
                _ => {}
            }
        }
        queued
    }

    /// Gets the next task for a worker thread.
    pub fn next_task(&self) -> Task {
        while let Some((txn_idx, incarnation)) = self.ready_queue.pop() {
            let mut task = self.tasks[txn_idx].lock();
            // Skip entries whose incarnation moved on since they were queued.
            if task.status == ExecutionStatus::Pending && task.incarnation == incarnation {
                task.status = ExecutionStatus::Executing(incarnation);
                self.executions.fetch_add(1, Ordering::Relaxed);
                return Task::Execute(txn_idx, incarnation);
            }
        }
        Task::Done
    }

    /// Marks a pending or aborted transaction as executing outside of a wave.
    ///
    /// Used by the synchronous path, which runs one index at a time on the
    /// calling thread.
    pub fn start_execution(&self, txn_idx: TxnIndex) -> Option<Incarnation> {
        let mut task = self.tasks[txn_idx].lock();
        match task.status {
            ExecutionStatus::Pending | ExecutionStatus::Aborted(_) => {
                task.status = ExecutionStatus::Executing(task.incarnation);
                self.executions.fetch_add(1, Ordering::Relaxed);
                Some(task.incarnation)
            }
            _ => None,
        }
    }

    /// Stores the record of a finished execution.
    ///
    /// Returns false, dropping the record, if it belongs to an incarnation the
    /// task is no longer executing.
    pub fn finish_execution(&self, txn_idx: TxnIndex, record: ExecutionRecord) -> bool {
        let mut task = self.tasks[txn_idx].lock();
        if task.status != ExecutionStatus::Executing(record.incarnation) {
            return false;
        }
        task.status = ExecutionStatus::Executed(record.incarnation);
        task.record = Some(record);
        true
    }

    /// Runs `f` on the record of an executed, not yet committed transaction.
    pub fn with_record<R>(
        &self,
        txn_idx: TxnIndex,
        f: impl FnOnce(&ExecutionRecord) -> R,
    ) -> Option<R> {
        let task = self.tasks[txn_idx].lock();
        match (task.status, task.record.as_ref()) {
            (ExecutionStatus::Executed(_), Some(record)) => Some(f(record)),
            _ => None,
        }
    }

    /// Aborts an executed transaction: discards its record and schedules the
    /// next incarnation.
    ///
    /// Fails the block if the next incarnation would exceed the retry ceiling.
    pub fn abort(&self, txn_idx: TxnIndex) -> BlockExecutionResult<Incarnation> {
        let mut task = self.tasks[txn_idx].lock();
        debug_assert!(matches!(task.status, ExecutionStatus::Executed(_)));

        task.record = None;
        let next = task.incarnation + 1;
        if next >= self.max_incarnations {
            return Err(BlockExecutionError::RetryLimitExceeded {
                txn_idx,
                max_incarnations: self.max_incarnations,
            });
        }
        task.incarnation = next;
        task.status = ExecutionStatus::Aborted(next);
        Ok(next)
    }

    /// Commits the next transaction of the committed prefix, applying its
    /// writes to the multi-version store.
    ///
    /// Returns false if `txn_idx` is not the first uncommitted index or has no
    /// executed record; nothing changes in that case.
    pub fn commit(&self, txn_idx: TxnIndex, mv: &MVHashMap) -> bool {
        if txn_idx != self.committed_prefix() {
            return false;
        }

        let mut task = self.tasks[txn_idx].lock();
        let record = match (task.status, task.record.take()) {
            (ExecutionStatus::Executed(_), Some(record)) => record,
            (_, record) => {
                task.record = record;
                return false;
            }
        };

        mv.apply_writeset(txn_idx, record.incarnation, &record.writes);
        task.outcome = Some(record.outcome);
        task.status = ExecutionStatus::Committed;
        self.committed_idx.store(txn_idx + 1, Ordering::Release);
        true
    }

    /// Number of transactions at the front of the block that are committed.
    pub fn committed_prefix(&self) -> usize {
        self.committed_idx.load(Ordering::Acquire)
    }

    /// Checks if all transactions are committed.
    pub fn is_done(&self) -> bool {
        self.committed_prefix() >= self.num_txns
    }

    /// Gets the current status of a transaction.
    pub fn status(&self, txn_idx: TxnIndex) -> ExecutionStatus {
        self.tasks[txn_idx].lock().status
    }

    pub fn incarnation(&self, txn_idx: TxnIndex) -> Incarnation {
        self.tasks[txn_idx].lock().incarnation
    }

    /// Highest incarnation among the transactions not yet committed.
    pub fn max_uncommitted_incarnation(&self) -> Incarnation {
        self.tasks[self.committed_prefix()..]
            .iter()
            .map(|task| task.lock().incarnation)
            .max()
            .unwrap_or(0)
    }

    /// True if one more parallel wave could push some transaction past the
    /// retry ceiling.
    ///
    /// A wave aborts each index at most once, and the synchronous path may
    /// abort a held-back record once more before re-executing it against a
    /// fully committed prefix, so two incarnations of headroom are needed.
    pub fn near_retry_ceiling(&self) -> bool {
        self.max_uncommitted_incarnation() + 2 >= self.max_incarnations
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Consumes the scheduler into the committed outcomes, in index order.
    pub fn into_outcomes(self) -> Vec<TxnOutcome> {
        self.tasks
            .into_iter()
            .filter_map(|task| task.into_inner().outcome)
            .collect()
    }

    /// Gets statistics about execution progress.
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats {
            executions: self.executions(),
            ..SchedulerStats::default()
        };

        for task in &self.tasks {
            let task = task.lock();
            stats.max_incarnation = stats.max_incarnation.max(task.incarnation);
            match task.status {
                ExecutionStatus::Pending => stats.pending += 1,
                ExecutionStatus::Executing(_) => stats.executing += 1,
                ExecutionStatus::Executed(_) => stats.executed += 1,
                ExecutionStatus::Aborted(_) => stats.aborted += 1,
                ExecutionStatus::Committed => stats.committed += 1,
            }
        }

        stats
    }
}

/// Statistics about scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub pending: usize,
    pub executing: usize,
    pub executed: usize,
    pub aborted: usize,
    pub committed: usize,
    pub executions: usize,
    pub max_incarnation: Incarnation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TxnOutput, WriteSet};

    fn record(incarnation: Incarnation) -> ExecutionRecord {
        ExecutionRecord {
            incarnation,
            reads: Default::default(),
            ranges: Vec::new(),
            writes: WriteSet::new(),
            outcome: TxnOutcome::Success(TxnOutput::default()),
        }
    }

    fn execute_next(scheduler: &Scheduler) -> (TxnIndex, Incarnation) {
        match scheduler.next_task() {
            Task::Execute(idx, inc) => {
                assert!(scheduler.finish_execution(idx, record(inc)));
                (idx, inc)
            }
            Task::Done => panic!("Expected Execute task"),
        }
    }

    #[test]
    fn test_scheduler_basic() {
        let scheduler = Scheduler::new(3, 8);
        assert_eq!(scheduler.begin_wave(), 3);

        // Tasks come out in index order.
        assert_eq!(scheduler.next_task(), Task::Execute(0, 0));
        assert_eq!(scheduler.next_task(), Task::Execute(1, 0));
        assert_eq!(scheduler.status(0), ExecutionStatus::Executing(0));
        assert_eq!(scheduler.next_task(), Task::Execute(2, 0));
        assert_eq!(scheduler.next_task(), Task::Done);
        assert_eq!(scheduler.executions(), 3);
    }

    #[test]
    fn test_abort_and_reexecute() {
        let scheduler = Scheduler::new(2, 8);
        scheduler.begin_wave();
        execute_next(&scheduler);
        execute_next(&scheduler);

        let mv = MVHashMap::new();
        assert!(scheduler.commit(0, &mv));
        assert_eq!(scheduler.abort(1), Ok(1));
        assert_eq!(scheduler.status(1), ExecutionStatus::Aborted(1));

        // Only the aborted transaction is scheduled in the next wave.
        assert_eq!(scheduler.begin_wave(), 1);
        assert_eq!(scheduler.next_task(), Task::Execute(1, 1));
        assert_eq!(scheduler.next_task(), Task::Done);
    }

    #[test]
    fn test_stale_record_is_discarded() {
        let scheduler = Scheduler::new(1, 8);
        scheduler.begin_wave();
        let (idx, _) = execute_next(&scheduler);
        scheduler.abort(idx).unwrap();
        scheduler.begin_wave();
        assert_eq!(scheduler.next_task(), Task::Execute(0, 1));

        // A record from incarnation 0 arriving late must not be accepted.
        assert!(!scheduler.finish_execution(0, record(0)));
        assert!(scheduler.with_record(0, |_| ()).is_none());
        assert!(scheduler.finish_execution(0, record(1)));
        assert_eq!(scheduler.with_record(0, |r| r.incarnation), Some(1));
    }

    #[test]
    fn test_commit_requires_prefix() {
        let scheduler = Scheduler::new(2, 8);
        scheduler.begin_wave();
        execute_next(&scheduler);
        execute_next(&scheduler);

        let mv = MVHashMap::new();
        assert!(!scheduler.commit(1, &mv));
        assert!(scheduler.commit(0, &mv));
        assert!(!scheduler.commit(0, &mv));
        assert!(scheduler.commit(1, &mv));
        assert!(scheduler.is_done());
        assert_eq!(scheduler.into_outcomes().len(), 2);
    }

    #[test]
    fn test_retry_ceiling() {
        let scheduler = Scheduler::new(1, 2);
        scheduler.begin_wave();
        execute_next(&scheduler);
        assert_eq!(scheduler.abort(0), Ok(1));

        scheduler.begin_wave();
        execute_next(&scheduler);
        assert_eq!(
            scheduler.abort(0),
            Err(BlockExecutionError::RetryLimitExceeded {
                txn_idx: 0,
                max_incarnations: 2
            })
        );
    }

    #[test]
    fn test_near_retry_ceiling() {
        let scheduler = Scheduler::new(2, 4);
        assert!(!scheduler.near_retry_ceiling());

        scheduler.begin_wave();
        execute_next(&scheduler);
        execute_next(&scheduler);
        let mv = MVHashMap::new();
        assert!(scheduler.commit(0, &mv));
        assert_eq!(scheduler.abort(1), Ok(1));
        assert_eq!(scheduler.max_uncommitted_incarnation(), 1);
        assert!(!scheduler.near_retry_ceiling());

        scheduler.begin_wave();
        execute_next(&scheduler);
        assert_eq!(scheduler.abort(1), Ok(2));
        assert!(scheduler.near_retry_ceiling());

        // Only one incarnation is ever needed when nothing can conflict.
        assert!(Scheduler::new(3, 1).near_retry_ceiling());
    }

    #[test]
    fn test_stats() {
        let scheduler = Scheduler::new(3, 8);
        scheduler.begin_wave();
        execute_next(&scheduler);
        execute_next(&scheduler);
        let mv = MVHashMap::new();
        scheduler.commit(0, &mv);
        scheduler.abort(1).unwrap();

        let stats = scheduler.stats();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.aborted, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.max_incarnation, 1);
        assert_eq!(stats.executions, 2);
    }
}
