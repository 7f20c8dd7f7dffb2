//! Block executor with optimistic concurrency control.

use crate::config::{CancellationToken, ExecutorConfig};
use crate::errors::{BlockExecutionError, BlockExecutionResult};
use crate::mvhashmap::MVHashMap;
use crate::scheduler::{Scheduler, Task};
use crate::storage::KvStore;
use crate::task::TransactionExecutor;
use crate::telemetry;
use crate::types::{
    BlockContext, Event, ExecutionRecord, Incarnation, Key, TxnIndex, TxnOutcome, Value,
};
use crate::validation::{run_validation_pass, validate_record};
use crate::view::TxnView;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Statistics about one block execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Parallel waves run (execution followed by a validation pass).
    pub waves: usize,
    /// Total number of transaction executions (including re-executions).
    pub executions: usize,
    /// Executions beyond the first attempt of each transaction.
    pub retries: usize,
    pub max_incarnation: Incarnation,
    /// Whether some or all transactions were processed by the sequential path.
    pub synchronous: bool,
    pub duration: Duration,
}

/// Result of block execution.
#[derive(Debug, Clone)]
pub struct BlockOutput {
    /// One outcome per transaction, in block order.
    pub outcomes: Vec<TxnOutcome>,
    /// Final value of every key written in the block, in key order. `None`
    /// means the key was deleted.
    pub write_set: Vec<(Key, Option<Value>)>,
    pub stats: ExecutionStats,
}

impl BlockOutput {
    /// Events of all transactions, in block order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.outcomes.iter().flat_map(|outcome| outcome.events())
    }

    pub fn gas_used(&self) -> u64 {
        self.outcomes.iter().map(TxnOutcome::gas_used).sum()
    }

    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.successful()
    }
}

/// Executes blocks of transactions, in parallel waves when OCC is enabled.
///
/// Every wave executes all pending transactions speculatively against the
/// writes committed so far, then a single-threaded pass validates them in
/// index order, committing the valid prefix and rescheduling stale ones. The
/// committed result is identical to executing the block sequentially.
pub struct ParallelExecutor<E> {
    config: ExecutorConfig,
    txn_executor: E,
    cancellation: Option<CancellationToken>,
}

impl<E: TransactionExecutor> ParallelExecutor<E> {
    /// Creates a new executor, rejecting invalid configurations.
    pub fn new(config: ExecutorConfig, txn_executor: E) -> BlockExecutionResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            txn_executor,
            cancellation: None,
        })
    }

    /// Abandons execution, without flushing anything, once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes a block and flushes its writes into `store`.
    ///
    /// `store` is only read until every transaction has committed; on error
    /// it is left untouched.
    pub fn execute_block<S: KvStore>(
        &self,
        store: &mut S,
        block: &BlockContext,
        transactions: &[E::Txn],
    ) -> BlockExecutionResult<BlockOutput> {
        let start = Instant::now();
        let num_txns = transactions.len();

        let scheduler = Scheduler::new(num_txns, self.config.max_incarnations);
        let mv_hashmap = MVHashMap::new();
        let mut waves = 0;
        let mut synchronous = self.config.is_sequential();

        {
            let base: &dyn KvStore = &*store;
            while !scheduler.is_done() {
                self.check_cancelled()?;

                if !synchronous {
                    let reason = if waves >= self.config.max_waves {
                        Some("wave limit")
                    } else if scheduler.near_retry_ceiling() {
                        Some("incarnation limit")
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        warn!(
                            height = block.height,
                            waves,
                            committed = scheduler.committed_prefix(),
                            reason,
                            "Falling back to sequential execution"
                        );
                        synchronous = true;
                    }
                }

                if synchronous {
                    self.process_sequentially(&scheduler, &mv_hashmap, base, block, transactions)?;
                    break;
                }

                let queued = scheduler.begin_wave();
                self.run_wave(&scheduler, &mv_hashmap, base, block, transactions, queued)?;
                // Records produced after cancellation must not reach validation.
                self.check_cancelled()?;

                let summary = run_validation_pass(&scheduler, &mv_hashmap, base)?;
                waves += 1;
                debug!(
                    wave = waves,
                    queued,
                    committed = summary.committed,
                    aborted = summary.aborted,
                    deferred = summary.deferred,
                    "Validation pass finished"
                );
            }
        }

        let write_set = mv_hashmap.latest_writes();
        for (key, value) in &write_set {
            match value {
                Some(value) => store.set(key.clone(), value.clone()),
                None => store.delete(key),
            }
        }

        let scheduler_stats = scheduler.stats();
        let stats = ExecutionStats {
            waves,
            executions: scheduler_stats.executions,
            retries: scheduler_stats.executions.saturating_sub(num_txns),
            max_incarnation: scheduler_stats.max_incarnation,
            synchronous,
            duration: start.elapsed(),
        };
        telemetry::record_block(num_txns, &stats);
        info!(
            height = block.height,
            txs = num_txns,
            latency_ms = stats.duration.as_millis() as u64,
            retries = stats.retries,
            max_incarnation = stats.max_incarnation,
            waves = stats.waves,
            sync = stats.synchronous,
            workers = self.config.num_threads,
            "OCC block executed"
        );

        Ok(BlockOutput {
            outcomes: scheduler.into_outcomes(),
            write_set,
            stats,
        })
    }

    /// Executes every queued transaction on a pool of scoped worker threads
    /// and returns once the queue is drained and all workers have exited.
    ///
    /// The pool is rebuilt for each wave and sized to the queued work.
    fn run_wave(
        &self,
        scheduler: &Scheduler,
        mv_hashmap: &MVHashMap,
        base: &dyn KvStore,
        block: &BlockContext,
        transactions: &[E::Txn],
        queued: usize,
    ) -> BlockExecutionResult<()> {
        let num_workers = self.config.num_threads.min(queued).max(1);

        crossbeam::scope(|s| {
            for worker_id in 0..num_workers {
                s.spawn(move |_| {
                    self.worker_loop(worker_id, scheduler, mv_hashmap, base, block, transactions)
                });
            }
        })
        .map_err(|_| BlockExecutionError::WorkerPanicked)
    }

    /// Worker thread main loop.
    fn worker_loop(
        &self,
        worker_id: usize,
        scheduler: &Scheduler,
        mv_hashmap: &MVHashMap,
        base: &dyn KvStore,
        block: &BlockContext,
        transactions: &[E::Txn],
    ) {
        let mut local_executions = 0;

        while let Task::Execute(txn_idx, incarnation) = scheduler.next_task() {
            if self.is_cancelled() {
                break;
            }

            let record = self.execute_transaction(
                txn_idx,
                incarnation,
                &transactions[txn_idx],
                mv_hashmap,
                base,
                block,
            );
            local_executions += 1;

            if self.is_cancelled() {
                break;
            }
            if !scheduler.finish_execution(txn_idx, record) {
                trace!(txn_idx, incarnation, "Dropped stale execution record");
            }
        }

        trace!(worker_id, local_executions, "Worker finished wave");
    }

    /// Runs the remaining transactions one at a time, in order, on the calling
    /// thread. Each transaction sees every lower index committed, so its
    /// execution is final on the first valid attempt.
    fn process_sequentially(
        &self,
        scheduler: &Scheduler,
        mv_hashmap: &MVHashMap,
        base: &dyn KvStore,
        block: &BlockContext,
        transactions: &[E::Txn],
    ) -> BlockExecutionResult<()> {
        for txn_idx in scheduler.committed_prefix()..scheduler.num_txns() {
            loop {
                self.check_cancelled()?;

                let verdict = scheduler.with_record(txn_idx, |record| {
                    validate_record(record, txn_idx, mv_hashmap, base)
                });
                match verdict {
                    Some(Ok(())) => {
                        scheduler.commit(txn_idx, mv_hashmap);
                        break;
                    }
                    Some(Err(_)) => {
                        scheduler.abort(txn_idx)?;
                    }
                    None => {}
                }

                if let Some(incarnation) = scheduler.start_execution(txn_idx) {
                    let record = self.execute_transaction(
                        txn_idx,
                        incarnation,
                        &transactions[txn_idx],
                        mv_hashmap,
                        base,
                        block,
                    );
                    scheduler.finish_execution(txn_idx, record);
                }
            }
        }
        Ok(())
    }

    /// Executes one attempt of a transaction against a fresh view.
    ///
    /// A panic in the transaction logic is caught here and becomes a fault
    /// outcome for this index; it never unwinds into the worker pool.
    fn execute_transaction(
        &self,
        txn_idx: TxnIndex,
        incarnation: Incarnation,
        txn: &E::Txn,
        mv_hashmap: &MVHashMap,
        base: &dyn KvStore,
        block: &BlockContext,
    ) -> ExecutionRecord {
        let mut view = TxnView::new(txn_idx, incarnation, block, mv_hashmap, base);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.txn_executor.execute(&mut view, txn)
        }));
        let outcome = match result {
            Ok(Ok(output)) => TxnOutcome::Success(output),
            Ok(Err(err)) => TxnOutcome::Failed(err),
            Err(payload) => TxnOutcome::Fault(panic_message(payload)),
        };

        view.into_record(outcome)
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map_or(false, CancellationToken::is_cancelled)
    }

    fn check_cancelled(&self) -> BlockExecutionResult<()> {
        if self.is_cancelled() {
            return Err(BlockExecutionError::Cancelled);
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "transaction panicked".to_string()
    }
}
