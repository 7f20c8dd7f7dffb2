//! Optimistic parallel executor.
//!
//! Wraps `occ-scheduler`'s [`ParallelExecutor`](occ_scheduler::ParallelExecutor)
//! for use in benchmarks and the CLI.

use super::{run_block, ExecutionResult, Executor};
use crate::Workload;
use occ_scheduler::{BlockExecutionResult, ExecutorConfig, MemoryStore};

/// OCC parallel executor.
///
/// Executes transactions speculatively on `num_threads` workers and validates
/// them in block order, producing the same state as [`super::SequentialExecutor`].
#[derive(Debug, Clone)]
pub struct OccExecutor {
    pub num_threads: usize,
    pub verify_signatures: bool,
    /// Waves before the rest of the block is processed synchronously.
    pub max_waves: usize,
}

impl OccExecutor {
    /// Creates a new OCC executor with the specified number of threads.
    pub fn new(num_threads: usize, verify_signatures: bool) -> Self {
        Self {
            num_threads,
            verify_signatures,
            max_waves: ExecutorConfig::default().max_waves,
        }
    }

    pub fn with_max_waves(mut self, max_waves: usize) -> Self {
        self.max_waves = max_waves;
        self
    }

    fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            num_threads: self.num_threads,
            occ_enabled: true,
            max_waves: self.max_waves,
            ..ExecutorConfig::default()
        }
    }
}

impl Executor for OccExecutor {
    fn execute(
        &self,
        store: MemoryStore,
        workload: &Workload,
    ) -> BlockExecutionResult<(MemoryStore, ExecutionResult)> {
        run_block(self.config(), self.verify_signatures, store, workload)
    }

    fn name(&self) -> &'static str {
        "occ_parallel"
    }
}
