//! Sequential transaction executor.
//!
//! This module provides a baseline executor that processes transactions one
//! at a time, in block order, with OCC disabled.

use super::{run_block, ExecutionResult, Executor};
use crate::Workload;
use occ_scheduler::{BlockExecutionResult, ExecutorConfig, MemoryStore};

/// Sequential executor that processes transactions one at a time.
///
/// This is the reference every parallel run is compared against.
///
/// # Example
///
/// ```
/// use occ_bench::{Executor, SequentialExecutor, Workload, WorkloadConfig};
///
/// let workload = Workload::generate(WorkloadConfig::default());
/// let store = workload.create_store();
///
/// let executor = SequentialExecutor::new(true); // with signature verification
/// let (final_store, result) = executor.execute(store, &workload).unwrap();
///
/// println!("Successful: {}, Failed: {}", result.successful, result.failed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequentialExecutor {
    /// Whether to verify signatures during execution.
    pub verify_signatures: bool,
}

impl SequentialExecutor {
    /// Creates a new sequential executor.
    ///
    /// # Arguments
    /// * `verify_signatures` - If true, recovers and verifies the signer address
    ///   from each transaction's signature before execution.
    pub fn new(verify_signatures: bool) -> Self {
        Self { verify_signatures }
    }
}

impl Executor for SequentialExecutor {
    fn execute(
        &self,
        store: MemoryStore,
        workload: &Workload,
    ) -> BlockExecutionResult<(MemoryStore, ExecutionResult)> {
        run_block(
            ExecutorConfig::sequential(),
            self.verify_signatures,
            store,
            workload,
        )
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}
