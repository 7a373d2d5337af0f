use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState, WriteType,
};

/// Shared map from transaction id to live transaction.
///
/// The lock manager wounds through this registry instead of knowing the
/// transaction manager; both hold the same instance.
#[derive(Default)]
pub struct TransactionRegistry {
    transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.transactions.lock().get(&txn_id).cloned()
    }

    fn register(&self, txn: Arc<Transaction>) {
        self.transactions.lock().insert(txn.id(), txn);
    }

    fn deregister(&self, txn_id: TxnId) {
        self.transactions.lock().remove(&txn_id);
    }
}

/// Creates transactions and drives their lifecycle: begin, commit with
/// deferred-delete finalization, abort with write-set rollback.
pub struct TransactionManager {
    next_txn_id: AtomicI32,
    lock_manager: Arc<LockManager>,
    registry: Arc<TransactionRegistry>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        let registry = Arc::clone(lock_manager.registry());
        Self {
            next_txn_id: AtomicI32::new(0),
            lock_manager,
            registry,
        }
    }

    /// Start a transaction. Ids grow monotonically, so a larger id always
    /// means a younger transaction.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.registry.register(Arc::clone(&txn));
        txn
    }

    /// Commit: make delete marks final, release every lock, finish.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::InvalidState(txn.id()))
            }
            _ => {}
        }

        for record in txn.take_table_writes() {
            if matches!(record.write_type, WriteType::Delete) {
                record.table.apply_delete(record.rid)?;
            }
        }
        txn.take_index_writes();

        self.release_locks(txn);
        txn.set_state(TransactionState::Committed);
        self.registry.deregister(txn.id());
        Ok(())
    }

    /// Abort: undo every table and index write (newest first), release
    /// every lock, finish. Also the required follow-up after a wound.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn.id()));
        }

        for record in txn.take_table_writes().into_iter().rev() {
            match record.write_type {
                WriteType::Insert => record.table.apply_delete(record.rid)?,
                WriteType::Delete => record.table.rollback_delete(record.rid)?,
                WriteType::Update { ref old_tuple } => {
                    record.table.update_tuple(record.rid, old_tuple)?
                }
            }
        }

        for record in txn.take_index_writes().into_iter().rev() {
            match record.write_type {
                WriteType::Insert => {
                    record.index.delete_entry(&record.tuple, record.rid)?;
                }
                WriteType::Delete => {
                    record.index.insert_entry(&record.tuple, record.rid)?;
                }
                WriteType::Update { ref old_tuple } => {
                    record.index.delete_entry(&record.tuple, record.rid)?;
                    record.index.insert_entry(old_tuple, record.rid)?;
                }
            }
        }

        self.release_locks(txn);
        txn.set_state(TransactionState::Aborted);
        self.registry.deregister(txn.id());
        Ok(())
    }

    fn release_locks(&self, txn: &Arc<Transaction>) {
        for rid in txn.held_locks() {
            self.lock_manager.unlock(txn, rid);
        }
    }
}
