//! Server transactions: the executor that runs the state machines in
//! [`crate::transaction::fsm`] against a listening point and real timers.

mod transaction;

pub use transaction::{ServerTransaction, HISTORY_LIMIT};

use async_trait::async_trait;

use crate::transaction::TransactionKey;

/// Owner of server transactions, told when one terminates itself
///
/// Implemented by the [`TransactionManager`](crate::manager::TransactionManager).
/// The call is made with the transaction's own lock held, so implementations
/// must not lock the transaction again.
#[async_trait]
pub trait TransactionRegistry: Send + Sync {
    /// Removes the transaction with `key`. Called at most once per transaction.
    async fn remove_transaction(&self, key: &TransactionKey);
}
