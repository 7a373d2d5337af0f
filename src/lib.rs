// Export public modules
pub mod common;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use index::hash::ExtendibleHashTable;
pub use index::IndexError;
pub use storage::buffer::{BufferPool, BufferPoolError, BufferPoolManager, ParallelBufferPoolManager};
pub use storage::page::{Page, PageError};
pub use storage::table::{TableHeap, Tuple};
pub use transaction::{
    IsolationLevel, LockManager, Transaction, TransactionError, TransactionManager,
    TransactionRegistry, TransactionState,
};
