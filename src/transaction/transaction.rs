use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Rid, TxnId};
use crate::index::table_index::TableIndex;
use crate::index::IndexError;
use crate::storage::table::heap::TableError;
use crate::storage::table::{TableHeap, Tuple};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Transaction states under two-phase locking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            _ => TransactionState::Aborted,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TransactionState::Growing => 0,
            TransactionState::Shrinking => 1,
            TransactionState::Committed => 2,
            TransactionState::Aborted => 3,
        }
    }
}

/// Errors surfaced by the lock manager and the transaction manager. Every
/// variant except `InvalidState` means the transaction must abort.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} was wounded by an older transaction")]
    Deadlock(TxnId),

    #[error("Transaction {0} tried to lock while shrinking")]
    LockOnShrinking(TxnId),

    #[error("Transaction {0} requested a shared lock under READ_UNCOMMITTED")]
    LockSharedOnReadUncommitted(TxnId),

    #[error("Transaction {0} upgrade rejected: another upgrade is in progress")]
    UpgradeConflict(TxnId),

    #[error("Transaction {0} is already finished")]
    InvalidState(TxnId),

    #[error("Table error during rollback: {0}")]
    Table(#[from] TableError),

    #[error("Index error during rollback: {0}")]
    Index(#[from] IndexError),
}

/// What a write did, for undo purposes.
#[derive(Debug, Clone)]
pub enum WriteType {
    Insert,
    Delete,
    Update { old_tuple: Tuple },
}

/// A table-heap write performed by a transaction.
pub struct TableWriteRecord {
    pub rid: Rid,
    pub tuple: Tuple,
    pub write_type: WriteType,
    pub table: Arc<TableHeap>,
}

/// An index write performed by a transaction.
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub tuple: Tuple,
    pub write_type: WriteType,
    pub index: Arc<TableIndex>,
}

/// An active transaction.
///
/// The state is atomic because the lock manager wounds transactions from
/// other threads; everything else is guarded by small mutexes so a
/// transaction handle can be shared freely.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: AtomicU8,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    table_write_set: Mutex<Vec<TableWriteRecord>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: AtomicU8::new(TransactionState::Growing.as_u8()),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            table_write_set: Mutex::new(Vec::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub fn shared_lock_count(&self) -> usize {
        self.shared_lock_set.lock().len()
    }

    pub fn exclusive_lock_count(&self) -> usize {
        self.exclusive_lock_set.lock().len()
    }

    pub(crate) fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub(crate) fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub(crate) fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub(crate) fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    /// Every rid this transaction holds a lock on.
    pub(crate) fn held_locks(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    /// Record a table write for commit finalization / abort rollback.
    pub fn append_table_write(&self, record: TableWriteRecord) {
        self.table_write_set.lock().push(record);
    }

    /// Record an index write for abort rollback.
    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    pub(crate) fn take_table_writes(&self) -> Vec<TableWriteRecord> {
        std::mem::take(&mut *self.table_write_set.lock())
    }

    pub(crate) fn take_index_writes(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut *self.index_write_set.lock())
    }
}
