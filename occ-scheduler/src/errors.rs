//! Error types for block execution.

use crate::types::TxnIndex;
use thiserror::Error;

/// A deterministic rejection raised by transaction logic (bad nonce,
/// insufficient balance, ...).
///
/// This is a final outcome, not a conflict: it is committed as a failed
/// transaction exactly like sequential execution would record it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("application error {code}: {log}")]
pub struct ApplicationError {
    pub code: u32,
    pub log: String,
    pub gas_used: u64,
}

impl ApplicationError {
    pub fn new(code: u32, log: impl Into<String>) -> Self {
        Self {
            code,
            log: log.into(),
            gas_used: 0,
        }
    }

    pub fn with_gas(mut self, gas_used: u64) -> Self {
        self.gas_used = gas_used;
        self
    }
}

/// Unrecoverable errors; the block is not committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockExecutionError {
    #[error("invalid executor config: {0}")]
    InvalidConfig(String),
    /// A transaction kept conflicting past the retry ceiling.
    #[error("transaction {txn_idx} exceeded {max_incarnations} incarnations")]
    RetryLimitExceeded {
        txn_idx: TxnIndex,
        max_incarnations: usize,
    },
    #[error("block execution cancelled")]
    Cancelled,
    #[error("worker thread panicked")]
    WorkerPanicked,
}

pub type BlockExecutionResult<T> = Result<T, BlockExecutionError>;
