//! Block execution metrics, exported through the `metrics` facade.

use crate::executor::ExecutionStats;
use metrics::{counter, gauge, histogram};

pub(crate) fn record_block(num_txns: usize, stats: &ExecutionStats) {
    counter!("occ.transactions").increment(num_txns as u64);
    counter!("occ.executions").increment(stats.executions as u64);
    counter!("occ.retries").increment(stats.retries as u64);
    if stats.synchronous {
        counter!("occ.synchronous_blocks").increment(1);
    }
    histogram!("occ.waves").record(stats.waves as f64);
    histogram!("occ.block_latency_ms").record(stats.duration.as_secs_f64() * 1000.0);
    gauge!("occ.max_incarnation").set(stats.max_incarnation as f64);
}
