//! CLI comparing sequential and OCC block execution.

use clap::{Parser, ValueEnum};
use eyre::{bail, Result};
use occ_bench::{
    ContentionPattern, Executor, ExecutionResult, OccExecutor, SequentialExecutor, Workload,
    WorkloadConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Run signed-transfer blocks sequentially and with OCC, and compare the results")]
struct Args {
    /// Number of accounts in the workload.
    #[arg(long, default_value_t = 1000)]
    accounts: usize,

    /// Number of transactions per block.
    #[arg(long, default_value_t = 1000)]
    transactions: usize,

    /// Contention patterns to run.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = Pattern::all())]
    patterns: Vec<Pattern>,

    /// Size of the hot set for the `hot-spot` pattern.
    #[arg(long, default_value_t = 8)]
    hot_accounts: usize,

    /// Share of `hot-spot` transfers confined to the hot set.
    #[arg(long, default_value_t = 0.8)]
    hot_ratio: f64,

    /// Share of transfers that overdraw their sender.
    #[arg(long, default_value_t = 0.0)]
    fail_ratio: f64,

    /// Worker counts to run the OCC executor with.
    #[arg(long, value_delimiter = ',', default_values_t = vec![2, 4, 8, 16])]
    threads: Vec<usize>,

    /// Parallel waves before falling back to synchronous processing.
    #[arg(long, default_value_t = 10)]
    max_waves: usize,

    /// Skip signature verification.
    #[arg(long)]
    no_verify: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let verify = !args.no_verify;

    println!("=== OCC Block Execution Benchmark ===\n");
    println!(
        "Configuration: {} accounts, {} transactions per block, signature verification {}\n",
        args.accounts,
        args.transactions,
        if verify { "on" } else { "off" }
    );

    for &pattern in &args.patterns {
        let workload = Workload::generate(WorkloadConfig {
            num_accounts: args.accounts,
            num_transactions: args.transactions,
            pattern: pattern.with_hot_set(args.hot_accounts, args.hot_ratio),
            fail_ratio: args.fail_ratio,
            seed: args.seed,
            chain_id: 1,
        });

        println!("--- {pattern:?} ---");

        let sequential = SequentialExecutor::new(verify);
        let (expected_store, expected) = sequential.execute(workload.create_store(), &workload)?;
        report(sequential.name(), 1, &expected);
        if expected.failed != workload.expected_failures() {
            bail!(
                "{} of {} transfers failed, expected {}",
                expected.failed,
                expected.total(),
                workload.expected_failures()
            );
        }

        for &num_threads in &args.threads {
            let executor = OccExecutor::new(num_threads, verify).with_max_waves(args.max_waves);
            let (store, result) = executor.execute(workload.create_store(), &workload)?;
            report(executor.name(), num_threads, &result);

            if store != expected_store || result.outcomes != expected.outcomes {
                bail!(
                    "{} with {} threads diverged from sequential execution on {:?}",
                    executor.name(),
                    num_threads,
                    pattern
                );
            }
        }
        info!(?pattern, "OCC results match sequential execution");
        println!();
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Pattern {
    Disjoint,
    HotSpot,
    SingleRecipient,
    Chain,
}

impl Pattern {
    fn all() -> Vec<Self> {
        vec![
            Self::Disjoint,
            Self::HotSpot,
            Self::SingleRecipient,
            Self::Chain,
        ]
    }

    fn with_hot_set(self, hot_accounts: usize, ratio: f64) -> ContentionPattern {
        match self {
            Self::Disjoint => ContentionPattern::Disjoint,
            Self::HotSpot => ContentionPattern::HotSpot {
                hot_accounts,
                ratio,
            },
            Self::SingleRecipient => ContentionPattern::SingleRecipient,
            Self::Chain => ContentionPattern::Chain,
        }
    }
}

fn report(name: &str, num_threads: usize, result: &ExecutionResult) {
    let secs = result.duration.as_secs_f64();
    let tps = if secs > 0.0 {
        result.total() as f64 / secs
    } else {
        0.0
    };

    println!(
        "{:14} {:3} threads | {:5} ok {:4} failed | {:6} execs {:3} waves{} | {:8.2} ms | {:8.0} tx/s",
        name,
        num_threads,
        result.successful,
        result.failed,
        result.executions,
        result.waves,
        if result.synchronous { " +sync" } else { "      " },
        secs * 1000.0,
        tps
    );
}
