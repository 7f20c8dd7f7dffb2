//! Workload execution strategies.
//!
//! This module provides the [`Executor`] trait and its two implementations:
//! a sequential baseline and the optimistic parallel executor. Both run the
//! same [`TransferExecutor`] business logic through `occ-scheduler`, so their
//! results can be compared directly.

mod occ;
mod sequential;

pub use occ::OccExecutor;
pub use sequential::SequentialExecutor;

use crate::{TransferExecutor, Workload};
use occ_scheduler::{
    BlockExecutionResult, BlockOutput, ExecutorConfig, MemoryStore, ParallelExecutor, TxnOutcome,
};
use std::time::Duration;

/// Result of executing a workload.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Number of successfully executed transactions.
    pub successful: usize,
    /// Number of failed transactions (rejected by the transfer logic or faulted).
    pub failed: usize,
    /// Total executions, including re-executions after conflicts.
    pub executions: usize,
    pub retries: usize,
    pub waves: usize,
    /// Whether part of the block fell back to synchronous processing.
    pub synchronous: bool,
    pub duration: Duration,
    /// Per-transaction outcomes, in block order.
    pub outcomes: Vec<TxnOutcome>,
}

impl ExecutionResult {
    /// Total number of transactions processed.
    pub fn total(&self) -> usize {
        self.successful + self.failed
    }
}

impl From<BlockOutput> for ExecutionResult {
    fn from(output: BlockOutput) -> Self {
        Self {
            successful: output.successful(),
            failed: output.failed(),
            executions: output.stats.executions,
            retries: output.stats.retries,
            waves: output.stats.waves,
            synchronous: output.stats.synchronous,
            duration: output.stats.duration,
            outcomes: output.outcomes,
        }
    }
}

/// Trait for different workload execution strategies.
pub trait Executor {
    /// Executes the workload as a single block on the given store.
    ///
    /// # Returns
    /// A tuple of (final store state, execution result).
    fn execute(
        &self,
        store: MemoryStore,
        workload: &Workload,
    ) -> BlockExecutionResult<(MemoryStore, ExecutionResult)>;

    /// Returns a human-readable name for this executor.
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Runs the workload's transfers through a [`ParallelExecutor`] built from
/// `config`.
fn run_block(
    config: ExecutorConfig,
    verify_signatures: bool,
    mut store: MemoryStore,
    workload: &Workload,
) -> BlockExecutionResult<(MemoryStore, ExecutionResult)> {
    let executor = ParallelExecutor::new(config, TransferExecutor::new(verify_signatures))?;
    let output = executor.execute_block(
        &mut store,
        &workload.block_context(),
        &workload.transactions,
    )?;
    Ok((store, output.into()))
}
