use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::common::types::PageId;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::BufferPoolManager;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

/// A sharded buffer pool: `num_instances` independent pool instances over
/// one disk manager, routed by `page_id % num_instances`.
///
/// There is no global state beyond the shard array and the rotation index
/// used to spread `new_page` pressure across shards.
pub struct ParallelBufferPoolManager {
    instances: Vec<BufferPoolManager>,
    start_index: AtomicU32,
}

impl ParallelBufferPoolManager {
    /// Create `num_instances` shards of `pool_size` frames each.
    pub fn new(
        num_instances: u32,
        pool_size: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        assert!(num_instances > 0);
        let disk_manager = Arc::new(DiskManager::new(db_path)?);

        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolManager::with_disk_manager(pool_size, num_instances, i, Arc::clone(&disk_manager))
            })
            .collect();

        Ok(Self {
            instances,
            start_index: AtomicU32::new(0),
        })
    }

    /// Total number of frames across all shards.
    pub fn pool_size(&self) -> usize {
        self.instances.len() * self.instances[0].pool_size()
    }

    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[page_id as usize % self.instances.len()]
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>, BufferPoolError> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    fn new_page(&self) -> Result<(PageId, Arc<Page>), BufferPoolError> {
        let num_instances = self.instances.len() as u32;

        // Rotate the starting shard so allocation pressure spreads out.
        let mut start = self.start_index.load(Ordering::Relaxed);
        loop {
            match self.start_index.compare_exchange_weak(
                start,
                (start + 1) % num_instances,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => start = observed,
            }
        }

        // One full scan: the first shard with a spare frame wins.
        for i in 0..num_instances {
            let index = ((start + i) % num_instances) as usize;
            match self.instances[index].new_page() {
                Ok(created) => return Ok(created),
                Err(BufferPoolError::PoolExhausted) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BufferPoolError::PoolExhausted)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_page_ids_route_back_to_their_shard() {
        let file = NamedTempFile::new().unwrap();
        let pool = ParallelBufferPoolManager::new(4, 3, file.path()).unwrap();

        let mut ids = Vec::new();
        for _ in 0..8 {
            let (page_id, _) = pool.new_page().unwrap();
            ids.push(page_id);
            pool.unpin_page(page_id, false).unwrap();
        }

        // Every id must be fetchable through the routing shard.
        for page_id in ids {
            let page = pool.fetch_page(page_id).unwrap();
            assert_eq!(page.page_id(), page_id);
            pool.unpin_page(page_id, false).unwrap();
        }
    }

    #[test]
    fn test_allocation_spreads_across_shards() {
        let file = NamedTempFile::new().unwrap();
        let pool = ParallelBufferPoolManager::new(2, 4, file.path()).unwrap();

        let mut residues = std::collections::HashSet::new();
        for _ in 0..4 {
            let (page_id, _) = pool.new_page().unwrap();
            residues.insert(page_id % 2);
            pool.unpin_page(page_id, false).unwrap();
        }
        assert_eq!(residues.len(), 2);
    }
}
