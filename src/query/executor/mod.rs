// Query Executor Module
//
// Pull-based operator iterators. Every operator exposes `init` and `next`;
// `next` yields tuples one at a time together with their rid. Operators
// acquire tuple locks through the lock manager according to the
// transaction's isolation level and record their writes in the transaction
// for commit/abort processing.

pub mod aggregation;
pub mod delete;
pub mod distinct;
pub mod expression;
pub mod hash_join;
pub mod insert;
pub mod limit;
pub mod nested_loop_join;
pub mod seq_scan;
pub mod update;

use std::sync::Arc;

use thiserror::Error;

use crate::common::types::Rid;
use crate::index::IndexError;
use crate::storage::buffer::BufferPoolError;
use crate::storage::table::heap::TableError;
use crate::storage::table::Tuple;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::{Transaction, TransactionError};

pub use aggregation::{AggregateType, AggregationExecutor};
pub use delete::DeleteExecutor;
pub use distinct::DistinctExecutor;
pub use expression::{CompareOp, Expression};
pub use hash_join::HashJoinExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::{UpdateExecutor, UpdateOp};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),
}

pub type QueryResult<T> = Result<T, ExecutorError>;

/// The Executor trait defines the iterator interface every operator
/// implements. A failing executor leaves the transaction to be aborted by
/// the caller.
pub trait Executor: Send {
    /// Initialize the operator before pulling tuples.
    fn init(&mut self) -> QueryResult<()>;

    /// Produce the next tuple, or None when exhausted.
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>>;
}

/// Everything an operator needs from its surroundings: the transaction it
/// runs in and the lock manager guarding tuples.
pub struct ExecutorContext {
    txn: Arc<Transaction>,
    lock_manager: Arc<LockManager>,
}

impl ExecutorContext {
    pub fn new(txn: Arc<Transaction>, lock_manager: Arc<LockManager>) -> Self {
        Self { txn, lock_manager }
    }

    pub fn txn(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }
}
