//! Optimistic concurrency control scheduler for block execution.
//!
//! Transactions of a block are executed speculatively in parallel and the
//! result is guaranteed to be identical to executing them one after another
//! in block order. Conflicts are detected after the fact by checking each
//! transaction's reads against the writes committed by lower indices.
//!
//! # Core Components
//!
//! - **MVHashMap**: Multi-version store holding the committed writes of every
//!   transaction, keyed by key and writer index
//! - **TxnView**: Per-attempt view that records reads and buffers writes
//! - **Scheduler**: Task slots, incarnations and the per-wave ready queue
//! - **ParallelExecutor**: Worker pool, validation loop and sequential fallback
//!
//! # Algorithm Overview
//!
//! 1. Every pending transaction is executed by the worker pool, reading only
//!    writes already committed
//! 2. A validation pass walks the block in index order; a transaction whose
//!    reads still resolve to the same writers commits if every lower index has
//!    committed
//! 3. Stale transactions are discarded and re-executed with the next incarnation
//! 4. After `max_waves` waves the remainder is processed synchronously
//! 5. Once everything committed, the final writes are flushed to the store
//!
//! # Example
//!
//! ```rust
//! use occ_scheduler::{
//!     task, BlockContext, ExecutorConfig, KvStore, MemoryStore, ParallelExecutor, TxnOutput,
//! };
//!
//! let executor = ParallelExecutor::new(
//!     ExecutorConfig::parallel(4),
//!     task::from_fn(|view, delta: &u64| {
//!         let current = view
//!             .get(b"counter")
//!             .map(|v| u64::from_be_bytes(v.try_into().unwrap()))
//!             .unwrap_or(0);
//!         view.set(b"counter".to_vec(), (current + delta).to_be_bytes().to_vec());
//!         Ok(TxnOutput::default())
//!     }),
//! )
//! .unwrap();
//!
//! let mut store = MemoryStore::new();
//! let output = executor
//!     .execute_block(&mut store, &BlockContext::default(), &[1, 2, 3])
//!     .unwrap();
//!
//! assert_eq!(output.successful(), 3);
//! assert_eq!(store.get(b"counter"), Some(6u64.to_be_bytes().to_vec()));
//! ```

pub mod config;
pub mod errors;
pub mod executor;
pub mod mvhashmap;
pub mod scheduler;
pub mod storage;
pub mod task;
mod telemetry;
pub mod types;
pub mod validation;
pub mod view;

pub use config::{CancellationToken, ExecutorConfig};
pub use errors::{ApplicationError, BlockExecutionError, BlockExecutionResult};
pub use executor::{BlockOutput, ExecutionStats, ParallelExecutor};
pub use storage::{KvStore, MemoryStore};
pub use task::TransactionExecutor;
pub use types::{
    BlockContext, Event, Incarnation, Key, TxnIndex, TxnOutcome, TxnOutput, Value, Version,
};
pub use view::TxnView;
