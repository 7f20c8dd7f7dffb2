//! Executor configuration.

use crate::errors::{BlockExecutionError, BlockExecutionResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for block execution.
///
/// Passed explicitly to [`crate::ParallelExecutor::new`]; there is no
/// process-wide switch for OCC.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of worker threads. `1` runs the sequential path.
    pub num_threads: usize,
    /// When false, transactions run sequentially regardless of `num_threads`.
    pub occ_enabled: bool,
    /// Upper bound on incarnations per transaction. Parallel waves stop, and
    /// the rest of the block runs synchronously, before any transaction can
    /// reach it; exceeding it fails the block.
    pub max_incarnations: usize,
    /// Parallel waves to run before the remaining transactions are processed
    /// synchronously.
    pub max_waves: usize,
}

impl ExecutorConfig {
    pub fn sequential() -> Self {
        Self {
            num_threads: 1,
            occ_enabled: false,
            ..Self::default()
        }
    }

    pub fn parallel(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Self::default()
        }
    }

    /// True if the block should be processed by the sequential path.
    pub fn is_sequential(&self) -> bool {
        !self.occ_enabled || self.num_threads <= 1
    }

    pub fn validate(&self) -> BlockExecutionResult<()> {
        if self.num_threads == 0 {
            return Err(BlockExecutionError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        if self.max_incarnations == 0 {
            return Err(BlockExecutionError::InvalidConfig(
                "max_incarnations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            occ_enabled: true,
            max_incarnations: 64,
            max_waves: 10,
        }
    }
}

/// Shared flag used to abandon block execution.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_modes() {
        assert!(ExecutorConfig::sequential().is_sequential());
        assert!(ExecutorConfig::parallel(1).is_sequential());
        assert!(!ExecutorConfig::parallel(4).is_sequential());
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let config = ExecutorConfig::parallel(0);
        assert!(matches!(
            config.validate(),
            Err(BlockExecutionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
