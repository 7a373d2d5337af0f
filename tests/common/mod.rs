use std::sync::Arc;

use anyhow::Result;
use tempfile::NamedTempFile;

use taigadb::storage::buffer::{BufferPool, BufferPoolManager, ParallelBufferPoolManager};
use taigadb::transaction::{LockManager, TransactionManager, TransactionRegistry};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a single buffer pool instance over a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path)?);
    Ok((buffer_pool, file))
}

// Create a sharded buffer pool over a temporary database
#[allow(dead_code)]
pub fn create_test_parallel_pool(
    num_instances: u32,
    pool_size: usize,
) -> Result<(Arc<ParallelBufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let pool = Arc::new(ParallelBufferPoolManager::new(num_instances, pool_size, path)?);
    Ok((pool, file))
}

// Same as above, erased to the trait object the index and heap consume
#[allow(dead_code)]
pub fn create_test_pool_handle(pool_size: usize) -> Result<(Arc<dyn BufferPool>, NamedTempFile)> {
    let (pool, file) = create_test_buffer_pool(pool_size)?;
    Ok((pool, file))
}

// Wire up a lock manager and a transaction manager sharing one registry
#[allow(dead_code)]
pub fn create_lock_system() -> (Arc<LockManager>, Arc<TransactionManager>) {
    let registry = Arc::new(TransactionRegistry::new());
    let lock_manager = Arc::new(LockManager::new(registry));
    let transaction_manager = Arc::new(TransactionManager::new(Arc::clone(&lock_manager)));
    (lock_manager, transaction_manager)
}
