//! Workload harness for the OCC block scheduler.
//!
//! This crate generates blocks of signed bank transfers, runs them through
//! `occ-scheduler` either sequentially or with optimistic parallel execution,
//! and checks that both strategies agree on the final state.
//!
//! # Architecture
//!
//! - **Workload**: funded signers and a block of signed transfers laid out by a
//!   [`ContentionPattern`], so each run exercises a known conflict shape
//! - **TransferExecutor**: The transfer business logic, written against the
//!   scheduler's per-transaction view
//! - **Executor**: A strategy for executing a workload (sequential or OCC)
//!
//! # Quick Start
//!
//! ```
//! use occ_bench::{ContentionPattern, Executor, OccExecutor, SequentialExecutor, Workload, WorkloadConfig};
//!
//! let workload = Workload::generate(WorkloadConfig {
//!     num_accounts: 100,
//!     num_transactions: 50,
//!     pattern: ContentionPattern::HotSpot { hot_accounts: 4, ratio: 0.5 },
//!     fail_ratio: 0.1,
//!     ..WorkloadConfig::default()
//! });
//!
//! let (sequential_store, expected) = SequentialExecutor::new(true)
//!     .execute(workload.create_store(), &workload)
//!     .unwrap();
//! let (occ_store, result) = OccExecutor::new(4, true)
//!     .execute(workload.create_store(), &workload)
//!     .unwrap();
//!
//! assert_eq!(occ_store, sequential_store);
//! assert_eq!(result.outcomes, expected.outcomes);
//! assert_eq!(result.failed, workload.expected_failures());
//! ```

pub mod bank;
pub mod executor;

pub use bank::{account_key, AccountState, TransferExecutor};
pub use executor::{ExecutionResult, Executor, OccExecutor, SequentialExecutor};

use alloy_primitives::{keccak256, Address, Signature, B256, U256};
use k256::ecdsa::SigningKey;
use occ_scheduler::{BlockContext, MemoryStore};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Balance every workload account starts with (1000 ETH).
pub const INITIAL_BALANCE: u128 = 1_000_000_000_000_000_000_000;

/// Amount moved by every payable transfer (0.001 ETH).
pub const TRANSFER_AMOUNT: u64 = 1_000_000_000_000_000;

/// Amount of an overdraft transfer. No account can hold it, so the transfer is
/// always rejected with `INSUFFICIENT_BALANCE`.
pub const OVERDRAFT_AMOUNT: U256 = U256::MAX;

const SIGNING_DOMAIN: &[u8] = b"occ-transfer";

/// A funded account that can sign transfers.
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
    pub address: Address,
}

impl Signer {
    /// Draws a fresh key from `rng`.
    pub fn generate(rng: &mut StdRng) -> Self {
        let key = SigningKey::random(rng);
        let address = Address::from_private_key(&key);
        Self { key, address }
    }

    /// Signs `transfer` for the chain `chain_id`.
    pub fn sign(&self, transfer: Transfer, chain_id: u64) -> SignedTransfer {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(transfer.signing_hash(chain_id).as_slice())
            .expect("signing a 32-byte prehash cannot fail");
        SignedTransfer {
            transfer,
            signature: Signature::from_signature_and_parity(sig, recovery_id.is_y_odd()),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signer").field(&self.address).finish()
    }
}

/// An unsigned transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub nonce: u64,
}

impl Transfer {
    /// Hash the sender signs. Commits to the chain so a transfer cannot be
    /// replayed on another one.
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        let mut data = Vec::with_capacity(SIGNING_DOMAIN.len() + 8 + 8 + 20 + 20 + 32);
        data.extend_from_slice(SIGNING_DOMAIN);
        data.extend_from_slice(&chain_id.to_be_bytes());
        data.extend_from_slice(&self.nonce.to_be_bytes());
        data.extend_from_slice(self.from.as_slice());
        data.extend_from_slice(self.to.as_slice());
        data.extend_from_slice(&self.amount.to_be_bytes::<32>());
        keccak256(&data)
    }

    pub fn is_overdraft(&self) -> bool {
        self.amount == OVERDRAFT_AMOUNT
    }
}

/// A transfer with the sender's recoverable signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub transfer: Transfer,
    pub signature: Signature,
}

impl SignedTransfer {
    /// Address that signed the transfer for `chain_id`, if the signature is
    /// well formed.
    pub fn recover(&self, chain_id: u64) -> Option<Address> {
        self.signature
            .recover_address_from_prehash(&self.transfer.signing_hash(chain_id))
            .ok()
    }

    /// Whether the sender signed this transfer for `chain_id`.
    pub fn verify(&self, chain_id: u64) -> bool {
        self.recover(chain_id) == Some(self.transfer.from)
    }
}

/// How the transfers of a block overlap on accounts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentionPattern {
    /// Transfer `i` moves funds between accounts `2i` and `2i + 1`. No two
    /// transfers share an account while `2 * num_transactions <= num_accounts`.
    Disjoint,
    /// With probability `ratio` both ends are drawn from the first
    /// `hot_accounts` accounts, otherwise from all of them.
    HotSpot { hot_accounts: usize, ratio: f64 },
    /// Every transfer pays account 0, so each one writes a key the previous
    /// one wrote.
    SingleRecipient,
    /// Transfer `i` pays the sender of transfer `i + 1`, so each one reads
    /// a balance the previous one wrote.
    Chain,
}

impl ContentionPattern {
    /// Sender and recipient indices of transfer `i`. Requires `n >= 2`.
    fn endpoints(&self, i: usize, n: usize, rng: &mut StdRng) -> (usize, usize) {
        match *self {
            Self::Disjoint => ((2 * i) % n, (2 * i + 1) % n),
            Self::HotSpot {
                hot_accounts,
                ratio,
            } => {
                let pool = if rng.gen::<f64>() < ratio {
                    hot_accounts.clamp(2, n)
                } else {
                    n
                };
                let from = rng.gen_range(0..pool);
                // Shift past the sender so both ends differ.
                let to = (from + rng.gen_range(1..pool)) % pool;
                (from, to)
            }
            Self::SingleRecipient => (1 + i % (n - 1), 0),
            Self::Chain => (i % n, (i + 1) % n),
        }
    }
}

/// Configuration for workload generation.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Number of funded accounts, at least 2.
    pub num_accounts: usize,
    pub num_transactions: usize,
    pub pattern: ContentionPattern,
    /// Share of transfers that overdraw the sender and must fail.
    pub fail_ratio: f64,
    /// Random seed for keys, endpoints and overdraft placement.
    pub seed: u64,
    /// Chain the transfers are signed for.
    pub chain_id: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            num_accounts: 1000,
            num_transactions: 100,
            pattern: ContentionPattern::Disjoint,
            fail_ratio: 0.0,
            seed: 42,
            chain_id: 1,
        }
    }
}

/// Funded signers and a block of signed transfers.
#[derive(Debug, Clone)]
pub struct Workload {
    pub signers: Vec<Signer>,
    pub transactions: Vec<SignedTransfer>,
    pub config: WorkloadConfig,
}

impl Workload {
    /// Generates and signs a block. Executed in order, every payable transfer
    /// succeeds and every overdraft fails, without consuming the sender's
    /// nonce.
    pub fn generate(config: WorkloadConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = config.num_accounts.max(2);

        let signers: Vec<Signer> = (0..n).map(|_| Signer::generate(&mut rng)).collect();
        let mut nonces = vec![0u64; n];

        let transactions = (0..config.num_transactions)
            .map(|i| {
                let (from, to) = config.pattern.endpoints(i, n, &mut rng);
                let overdraft = rng.gen::<f64>() < config.fail_ratio;
                let transfer = Transfer {
                    from: signers[from].address,
                    to: signers[to].address,
                    amount: if overdraft {
                        OVERDRAFT_AMOUNT
                    } else {
                        U256::from(TRANSFER_AMOUNT)
                    },
                    nonce: nonces[from],
                };
                if !overdraft {
                    nonces[from] += 1;
                }
                signers[from].sign(transfer, config.chain_id)
            })
            .collect();

        Self {
            signers,
            transactions,
            config,
        }
    }

    /// Number of transfers that fail when the block runs on [`Self::create_store`].
    pub fn expected_failures(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| tx.transfer.is_overdraft())
            .count()
    }

    /// Creates a store with every account funded with [`INITIAL_BALANCE`].
    pub fn create_store(&self) -> MemoryStore {
        self.create_store_with_balance(U256::from(INITIAL_BALANCE))
    }

    /// Creates a store with every account funded with `balance`.
    pub fn create_store_with_balance(&self, balance: U256) -> MemoryStore {
        self.signers
            .iter()
            .map(|signer| {
                (
                    account_key(&signer.address),
                    AccountState::new(0, balance).encode(),
                )
            })
            .collect()
    }

    /// Context of the block the workload's transactions are executed in.
    pub fn block_context(&self) -> BlockContext {
        BlockContext {
            height: 1,
            time: 0,
            chain_id: self.config.chain_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use occ_scheduler::KvStore;
    use std::collections::{HashMap, HashSet};

    fn workload(pattern: ContentionPattern, accounts: usize, txns: usize) -> Workload {
        Workload::generate(WorkloadConfig {
            num_accounts: accounts,
            num_transactions: txns,
            pattern,
            ..WorkloadConfig::default()
        })
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = workload(ContentionPattern::Chain, 4, 10);
        let b = workload(ContentionPattern::Chain, 4, 10);
        assert_eq!(a.transactions, b.transactions);

        let addresses: HashSet<_> = a.signers.iter().map(|s| s.address).collect();
        assert_eq!(addresses.len(), 4);
    }

    #[test]
    fn test_signature_is_bound_to_chain_and_contents() {
        let w = workload(ContentionPattern::Disjoint, 2, 1);
        let tx = &w.transactions[0];

        assert!(tx.verify(1));
        assert_eq!(tx.recover(1), Some(w.signers[0].address));
        assert!(!tx.verify(2));

        let mut tampered = tx.clone();
        tampered.transfer.amount += U256::from(1);
        assert!(!tampered.verify(1));
    }

    #[test]
    fn test_disjoint_transfers_share_no_account() {
        let w = workload(ContentionPattern::Disjoint, 40, 20);
        let mut seen = HashSet::new();
        for tx in &w.transactions {
            assert!(seen.insert(tx.transfer.from));
            assert!(seen.insert(tx.transfer.to));
        }
    }

    #[test]
    fn test_single_recipient_and_chain_layouts() {
        let w = workload(ContentionPattern::SingleRecipient, 5, 12);
        for tx in &w.transactions {
            assert_eq!(tx.transfer.to, w.signers[0].address);
            assert_ne!(tx.transfer.from, w.signers[0].address);
        }

        let w = workload(ContentionPattern::Chain, 5, 12);
        for pair in w.transactions.windows(2) {
            assert_eq!(pair[0].transfer.to, pair[1].transfer.from);
        }
    }

    #[test]
    fn test_hot_spot_stays_in_hot_set() {
        let w = workload(
            ContentionPattern::HotSpot {
                hot_accounts: 3,
                ratio: 1.0,
            },
            50,
            40,
        );
        let hot: HashSet<_> = w.signers[..3].iter().map(|s| s.address).collect();
        for tx in &w.transactions {
            assert!(hot.contains(&tx.transfer.from));
            assert!(hot.contains(&tx.transfer.to));
            assert_ne!(tx.transfer.from, tx.transfer.to);
        }
    }

    #[test]
    fn test_overdrafts_do_not_consume_nonces() {
        let w = Workload::generate(WorkloadConfig {
            num_accounts: 3,
            num_transactions: 60,
            pattern: ContentionPattern::Chain,
            fail_ratio: 0.3,
            ..WorkloadConfig::default()
        });
        assert!(w.expected_failures() > 0);
        assert!(w.expected_failures() < 60);

        let mut next: HashMap<Address, u64> = HashMap::new();
        for tx in &w.transactions {
            let expected = next.entry(tx.transfer.from).or_insert(0);
            assert_eq!(tx.transfer.nonce, *expected);
            if !tx.transfer.is_overdraft() {
                *expected += 1;
            }
        }
    }

    #[test]
    fn test_store_funds_every_account() {
        let w = workload(ContentionPattern::Disjoint, 8, 0);
        let store = w.create_store();

        assert_eq!(store.len(), 8);
        for signer in &w.signers {
            let bytes = store.get(&account_key(&signer.address)).unwrap();
            assert_eq!(
                AccountState::decode(&bytes),
                Some(AccountState::new(0, U256::from(INITIAL_BALANCE)))
            );
        }
    }
}
