//! Bank transfer business logic over the OCC key-value view.
//!
//! Each account is stored under `acct/<address>` as its nonce followed by its
//! balance, both big-endian.

use crate::SignedTransfer;
use alloy_primitives::{Address, U256};
use occ_scheduler::{ApplicationError, Event, Key, TransactionExecutor, TxnOutput, TxnView, Value};

/// Gas charged for a successful transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// Application error codes.
pub mod codes {
    pub const MALFORMED_ACCOUNT: u32 = 1;
    pub const INVALID_SIGNATURE: u32 = 2;
    pub const INVALID_NONCE: u32 = 3;
    pub const INSUFFICIENT_BALANCE: u32 = 5;
}

const ACCOUNT_PREFIX: &[u8] = b"acct/";
const ENCODED_LEN: usize = 8 + 32;

/// Nonce and balance of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
}

impl AccountState {
    pub fn new(nonce: u64, balance: U256) -> Self {
        Self { nonce, balance }
    }

    pub fn encode(&self) -> Value {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes::<32>());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ENCODED_LEN {
            return None;
        }
        let (nonce, balance) = bytes.split_at(8);
        Some(Self {
            nonce: u64::from_be_bytes(nonce.try_into().ok()?),
            balance: U256::from_be_slice(balance),
        })
    }
}

/// Store key of an account.
pub fn account_key(address: &Address) -> Key {
    let mut key = Vec::with_capacity(ACCOUNT_PREFIX.len() + 20);
    key.extend_from_slice(ACCOUNT_PREFIX);
    key.extend_from_slice(address.as_slice());
    key
}

/// Executes signed transfers: checks the signature, the sender's nonce and
/// balance, then moves `amount` from sender to recipient.
#[derive(Debug, Clone, Default)]
pub struct TransferExecutor {
    pub verify_signatures: bool,
}

impl TransferExecutor {
    pub fn new(verify_signatures: bool) -> Self {
        Self { verify_signatures }
    }
}

impl TransactionExecutor for TransferExecutor {
    type Txn = SignedTransfer;

    fn execute(
        &self,
        view: &mut TxnView<'_>,
        signed: &SignedTransfer,
    ) -> Result<TxnOutput, ApplicationError> {
        if self.verify_signatures && !signed.verify(view.block().chain_id) {
            return Err(ApplicationError::new(
                codes::INVALID_SIGNATURE,
                "invalid signature",
            ));
        }
        let tx = &signed.transfer;

        let sender_key = account_key(&tx.from);
        let mut sender = load(view, &sender_key)?;
        if sender.nonce != tx.nonce {
            return Err(ApplicationError::new(
                codes::INVALID_NONCE,
                format!("expected nonce {}, got {}", sender.nonce, tx.nonce),
            ));
        }
        if sender.balance < tx.amount {
            return Err(ApplicationError::new(
                codes::INSUFFICIENT_BALANCE,
                "insufficient balance",
            ));
        }

        sender.nonce += 1;
        sender.balance -= tx.amount;
        view.set(sender_key, sender.encode());

        // Read the recipient after writing the sender so self-transfers see
        // the debited balance.
        let recipient_key = account_key(&tx.to);
        let mut recipient = load(view, &recipient_key)?;
        recipient.balance += tx.amount;
        view.set(recipient_key, recipient.encode());

        Ok(TxnOutput {
            gas_used: TRANSFER_GAS,
            events: vec![Event::new("transfer")
                .with_attribute("sender", tx.from.to_string())
                .with_attribute("recipient", tx.to.to_string())
                .with_attribute("amount", tx.amount.to_string())],
            data: Vec::new(),
        })
    }
}

/// Loads an account, treating a missing entry as an empty account.
fn load(view: &mut TxnView<'_>, key: &[u8]) -> Result<AccountState, ApplicationError> {
    match view.get(key) {
        None => Ok(AccountState::default()),
        Some(bytes) => AccountState::decode(&bytes).ok_or_else(|| {
            ApplicationError::new(codes::MALFORMED_ACCOUNT, "malformed account state")
        }),
    }
}
