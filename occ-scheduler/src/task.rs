//! Interface to the transaction business logic.

use crate::errors::ApplicationError;
use crate::types::TxnOutput;
use crate::view::TxnView;
use std::marker::PhantomData;

/// Executes a single transaction against its view.
///
/// Implementations must perform every state access through `view` and must
/// be deterministic given the values they read: the scheduler may run the
/// same transaction several times and keeps only the attempt whose reads
/// match sequential execution. Returning `Err` records a failed transaction
/// and discards its writes.
pub trait TransactionExecutor: Sync {
    type Txn: Sync;

    fn execute(
        &self,
        view: &mut TxnView<'_>,
        txn: &Self::Txn,
    ) -> Result<TxnOutput, ApplicationError>;
}

/// Adapts a closure into a [`TransactionExecutor`].
pub struct FnExecutor<F, T> {
    f: F,
    _txn: PhantomData<fn(&T)>,
}

pub fn from_fn<F, T>(f: F) -> FnExecutor<F, T>
where
    F: Fn(&mut TxnView<'_>, &T) -> Result<TxnOutput, ApplicationError> + Sync,
    T: Sync,
{
    FnExecutor {
        f,
        _txn: PhantomData,
    }
}

impl<F, T> TransactionExecutor for FnExecutor<F, T>
where
    F: Fn(&mut TxnView<'_>, &T) -> Result<TxnOutput, ApplicationError> + Sync,
    T: Sync,
{
    type Txn = T;

    fn execute(&self, view: &mut TxnView<'_>, txn: &T) -> Result<TxnOutput, ApplicationError> {
        (self.f)(view, txn)
    }
}
