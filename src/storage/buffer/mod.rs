pub mod error;
pub mod manager;
pub mod parallel;
pub mod replacer;

use std::sync::Arc;

use crate::common::types::PageId;
use crate::storage::page::Page;

pub use error::BufferPoolError;
pub use manager::BufferPoolManager;
pub use parallel::ParallelBufferPoolManager;

/// The buffer pool contract consumed by the table heap, the hash index and
/// the executors. Implemented by a single pool instance and by the sharded
/// pool alike.
pub trait BufferPool: Send + Sync {
    /// Fetch the page with the given id, pinning it.
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>, BufferPoolError>;

    /// Allocate a fresh page id and a zeroed, pinned, dirty frame for it.
    fn new_page(&self) -> Result<(PageId, Arc<Page>), BufferPoolError>;

    /// Drop one pin; `is_dirty` records that the caller modified the page.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError>;

    /// Write the page back to disk if it is dirty.
    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;

    /// Write every resident dirty page back to disk.
    fn flush_all_pages(&self) -> Result<(), BufferPoolError>;

    /// Evict an unpinned page and return its frame to the free list.
    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError>;
}
