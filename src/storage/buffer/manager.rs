use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{FrameId, PageId, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LRUReplacer;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

/// A single buffer pool instance.
///
/// Owns `pool_size` frames, the free list, the page table and one LRU
/// replacer. The page table sits behind a shared/exclusive lock so lookups
/// (fetch, unpin, flush) run concurrently; only installs and evictions take
/// it exclusively. Page metadata is protected by each frame's own spin lock
/// and page contents by each frame's reader/writer latch.
///
/// Lock ordering is page table -> frame metadata -> page contents; no path
/// acquires them in the reverse direction.
pub struct BufferPoolManager {
    pool_size: usize,
    /// How many instances exist in the owning parallel pool (1 standalone).
    num_instances: u32,
    /// Index of this instance within the parallel pool (0 standalone).
    instance_index: u32,
    /// Ids handed out by this instance satisfy
    /// `page_id % num_instances == instance_index`.
    next_page_id: AtomicI32,
    frames: Vec<Arc<Page>>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: Mutex<VecDeque<FrameId>>,
    replacer: LRUReplacer,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Create a standalone pool over its own database file.
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, 1, 0, disk_manager))
    }

    /// Create one instance of a parallel pool sharing a disk manager.
    pub fn with_disk_manager(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0);
        assert!(instance_index < num_instances);

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            frames.push(Arc::new(Page::new()));
            free_list.push_back(i as FrameId);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            next_page_id: AtomicI32::new(instance_index as PageId),
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: LRUReplacer::new(pool_size),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Hand out the next page id for this instance. Ids are monotonic and
    /// never recycled.
    fn allocate_page(&self) -> PageId {
        let page_id = self.next_page_id.fetch_add(self.num_instances as i32, Ordering::SeqCst);
        debug_assert_eq!(page_id as u32 % self.num_instances, self.instance_index);
        page_id
    }

    /// Try to install `requested` (or a freshly allocated id when it is
    /// INVALID) into a frame popped off the free list.
    ///
    /// Returns the resolved page id and the serving frame, which may be a
    /// different, already-resident frame when another thread installed the
    /// same page while we weren't holding the table lock.
    fn free_list_get(&self, requested: PageId) -> Result<Option<(PageId, FrameId)>, BufferPoolError> {
        let frame_id = match self.free_list.lock().pop_front() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let frame = &self.frames[frame_id as usize];

        let mut table = self.page_table.write();
        let page_id = if requested == INVALID_PAGE_ID {
            self.allocate_page()
        } else {
            requested
        };
        let needs_io = requested != INVALID_PAGE_ID;

        if let Some(&resident_frame_id) = table.get(&page_id) {
            // Someone installed the page while we were off the table lock;
            // hand the free frame back and pin the resident one. This can
            // only happen on the fetch path, never for a fresh id.
            self.free_list.lock().push_back(frame_id);
            let resident = &self.frames[resident_frame_id as usize];
            resident.meta().pin_count += 1;
            return Ok(Some((page_id, resident_frame_id)));
        }

        table.insert(page_id, frame_id);
        frame.meta().reset_for(page_id);

        // Take the write latch before publishing the mapping so that no
        // reader can observe a half-loaded frame, then do the I/O off the
        // table lock.
        let mut data = frame.data().write();
        drop(table);

        data.fill(0);
        if needs_io {
            self.disk_manager.read_page(page_id, &mut data)?;
        } else {
            frame.mark_dirty();
        }
        drop(data);

        Ok(Some((page_id, frame_id)))
    }

    /// Evict a victim frame chosen by the replacer and install `requested`
    /// (or a freshly allocated id) into it.
    ///
    /// The replacer only proposes candidates; the victim's pin count and
    /// dirty flag are re-checked under the table lock because another thread
    /// may have re-pinned or re-dirtied the frame in the meantime.
    fn replacer_get(&self, requested: PageId) -> Result<Option<(PageId, FrameId)>, BufferPoolError> {
        loop {
            let frame_id = match self.replacer.victim() {
                Some(frame_id) => frame_id,
                None => return Ok(None),
            };
            let frame = &self.frames[frame_id as usize];

            let is_dirty = {
                let mut meta = frame.meta();
                meta.pin_count += 1;
                meta.is_dirty
            };
            if is_dirty {
                self.flush_frame(frame)?;
            }

            let mut table = self.page_table.write();
            let mut meta = frame.meta();
            if meta.pin_count > 1 || meta.is_dirty {
                // Re-pinned or re-dirtied before we could claim it; put it
                // back and look for another victim.
                let old_pin_count = meta.pin_count;
                meta.pin_count -= 1;
                drop(meta);
                drop(table);
                if old_pin_count == 1 {
                    self.replacer.unpin(frame_id);
                }
                continue;
            }

            let page_id = if requested == INVALID_PAGE_ID {
                self.allocate_page()
            } else {
                requested
            };
            let needs_io = requested != INVALID_PAGE_ID;

            if let Some(&resident_frame_id) = table.get(&page_id) {
                // Someone has already installed the page for us; release the
                // clean victim and pin the resident frame instead.
                meta.pin_count -= 1;
                drop(meta);
                let resident = &self.frames[resident_frame_id as usize];
                resident.meta().pin_count += 1;
                drop(table);
                // The victim must stay visible to the replacer or it could
                // never be chosen again.
                self.replacer.unpin(frame_id);
                return Ok(Some((page_id, resident_frame_id)));
            }

            let old_page_id = meta.page_id;
            meta.reset_for(page_id);
            drop(meta);

            let mut data = frame.data().write();
            if old_page_id != INVALID_PAGE_ID {
                table.remove(&old_page_id);
            }
            table.insert(page_id, frame_id);
            drop(table);

            data.fill(0);
            if needs_io {
                self.disk_manager.read_page(page_id, &mut data)?;
            } else {
                frame.mark_dirty();
            }
            drop(data);

            return Ok(Some((page_id, frame_id)));
        }
    }

    /// Write a pinned frame's contents to disk and clear its dirty flag,
    /// unless a concurrent writer re-dirtied the page mid-flight.
    fn flush_frame(&self, frame: &Page) -> Result<(), BufferPoolError> {
        let data = frame.data().read();
        let page_id = {
            let mut meta = frame.meta();
            debug_assert!(meta.pin_count > 0);
            meta.just_dirtied = false;
            meta.page_id
        };

        self.disk_manager.write_page(page_id, &data)?;

        let mut meta = frame.meta();
        if !meta.just_dirtied {
            meta.is_dirty = false;
        }
        Ok(())
    }

    /// Shared frame-acquisition path of `fetch_page` and `new_page`: free
    /// list first, then the replacer.
    fn acquire_frame(&self, requested: PageId) -> Result<(PageId, FrameId), BufferPoolError> {
        if let Some(found) = self.free_list_get(requested)? {
            return Ok(found);
        }
        if let Some(found) = self.replacer_get(requested)? {
            return Ok(found);
        }
        Err(BufferPoolError::PoolExhausted)
    }
}

impl BufferPool for BufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "cannot fetch the invalid page id".to_string(),
            ));
        }

        let mut resident = None;
        {
            let table = self.page_table.read();
            if let Some(&frame_id) = table.get(&page_id) {
                let frame = &self.frames[frame_id as usize];
                let mut meta = frame.meta();
                debug_assert_eq!(meta.page_id, page_id);
                let old_pin_count = meta.pin_count;
                meta.pin_count += 1;
                resident = Some((frame_id, old_pin_count));
            }
        }

        // The replacer update lags the pin-count bump; that is fine because
        // the eviction path re-checks pin counts after victim selection.
        if let Some((frame_id, old_pin_count)) = resident {
            if old_pin_count == 0 {
                self.replacer.pin(frame_id);
            }
            return Ok(Arc::clone(&self.frames[frame_id as usize]));
        }

        let (_, frame_id) = self.acquire_frame(page_id)?;
        Ok(Arc::clone(&self.frames[frame_id as usize]))
    }

    fn new_page(&self) -> Result<(PageId, Arc<Page>), BufferPoolError> {
        let (page_id, frame_id) = self.acquire_frame(INVALID_PAGE_ID)?;
        Ok((page_id, Arc::clone(&self.frames[frame_id as usize])))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let frame_id = {
            let table = self.page_table.read();
            match table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => {
                    warn!("unpin of a non-resident page, page id = {}", page_id);
                    return Err(BufferPoolError::PageNotFound(page_id));
                }
            }
        };
        let frame = &self.frames[frame_id as usize];

        // Unpinning is less critical than pinning, so it runs off the table
        // lock; the frame cannot leave the table while still pinned.
        let old_pin_count = {
            let mut meta = frame.meta();
            if meta.pin_count <= 0 {
                warn!("unpin of a page with pin_count <= 0, page id = {}", page_id);
                return Err(BufferPoolError::NotPinned(page_id));
            }
            let old_pin_count = meta.pin_count;
            meta.pin_count -= 1;
            if is_dirty {
                meta.is_dirty = true;
                meta.just_dirtied = true;
            }
            old_pin_count
        };

        if old_pin_count == 1 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let (frame_id, old_pin_count) = {
            let table = self.page_table.read();
            let frame_id = match table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => return Err(BufferPoolError::PageNotFound(page_id)),
            };
            let frame = &self.frames[frame_id as usize];
            let mut meta = frame.meta();
            if !meta.is_dirty {
                return Ok(());
            }
            // Pin so the frame cannot be evicted while we do the I/O.
            let old_pin_count = meta.pin_count;
            meta.pin_count += 1;
            (frame_id, old_pin_count)
        };

        if old_pin_count == 0 {
            self.replacer.pin(frame_id);
        }

        let frame = &self.frames[frame_id as usize];
        let result = self.flush_frame(frame);

        let old_pin_count = {
            let mut meta = frame.meta();
            let old_pin_count = meta.pin_count;
            meta.pin_count -= 1;
            old_pin_count
        };
        if old_pin_count == 1 {
            self.replacer.unpin(frame_id);
        }
        result
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        // The shared table lock keeps every resident page resident for the
        // whole sweep, so no pin/unpin dance is needed here.
        let table = self.page_table.read();
        for (&page_id, &frame_id) in table.iter() {
            let frame = &self.frames[frame_id as usize];
            let is_dirty = {
                let meta = frame.meta();
                debug_assert_eq!(meta.page_id, page_id);
                meta.is_dirty
            };
            if !is_dirty {
                continue;
            }

            let data = frame.data().read();
            frame.meta().just_dirtied = false;
            self.disk_manager.write_page(page_id, &data)?;
            let mut meta = frame.meta();
            if !meta.just_dirtied {
                meta.is_dirty = false;
            }
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let frame_id = {
            let table = self.page_table.read();
            let frame_id = match table.get(&page_id) {
                Some(&frame_id) => frame_id,
                // Deleting a page nobody has is fine.
                None => return Ok(()),
            };
            let frame = &self.frames[frame_id as usize];
            let mut meta = frame.meta();
            debug_assert_eq!(meta.page_id, page_id);
            if meta.pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }
            meta.pin_count += 1;
            frame_id
        };
        let frame = &self.frames[frame_id as usize];

        // The pin count was zero when we read it under the table lock, so
        // the frame may sit in the replacer; take it out.
        self.replacer.pin(frame_id);

        {
            let mut table = self.page_table.write();
            let mut meta = frame.meta();
            if meta.pin_count > 1 {
                // Someone re-pinned the page before we got the exclusive
                // table lock; back off.
                meta.pin_count -= 1;
                return Err(BufferPoolError::PagePinned(page_id));
            }
            meta.page_id = INVALID_PAGE_ID;
            meta.is_dirty = false;
            meta.just_dirtied = false;
            meta.pin_count = 0;
            drop(meta);
            table.remove(&page_id);
            // Deallocation of the id itself is a no-op: ids are never
            // recycled.
        }

        self.free_list.lock().push_back(frame_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_pool(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let pool = BufferPoolManager::new(pool_size, file.path()).unwrap();
        (pool, file)
    }

    #[test]
    fn test_new_page_ids_are_monotonic() {
        let (pool, _file) = test_pool(10);
        for expected in 0..10 {
            let (page_id, _) = pool.new_page().unwrap();
            assert_eq!(page_id, expected);
        }
    }

    #[test]
    fn test_pool_exhausted_when_all_pinned() {
        let (pool, _file) = test_pool(1);
        let (page_id, _page) = pool.new_page().unwrap();
        assert!(matches!(pool.new_page(), Err(BufferPoolError::PoolExhausted)));
        assert!(matches!(
            pool.fetch_page(page_id + 1),
            Err(BufferPoolError::PoolExhausted)
        ));

        pool.unpin_page(page_id, false).unwrap();
        assert!(pool.new_page().is_ok());
    }

    #[test]
    fn test_fetch_resident_page_shares_frame() {
        let (pool, _file) = test_pool(4);
        let (page_id, page) = pool.new_page().unwrap();
        let fetched = pool.fetch_page(page_id).unwrap();
        assert!(Arc::ptr_eq(&page, &fetched));
        assert_eq!(page.pin_count(), 2);

        pool.unpin_page(page_id, false).unwrap();
        pool.unpin_page(page_id, false).unwrap();
        assert_eq!(page.pin_count(), 0);
    }

    #[test]
    fn test_unpin_errors() {
        let (pool, _file) = test_pool(4);
        assert!(matches!(
            pool.unpin_page(42, false),
            Err(BufferPoolError::PageNotFound(42))
        ));

        let (page_id, _page) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false).unwrap();
        assert!(matches!(
            pool.unpin_page(page_id, false),
            Err(BufferPoolError::NotPinned(_))
        ));
    }

    #[test]
    fn test_eviction_round_trip_preserves_contents() {
        let (pool, _file) = test_pool(2);

        let (first_id, first) = pool.new_page().unwrap();
        first.data().write()[0..4].copy_from_slice(b"keep");
        first.mark_dirty();
        pool.unpin_page(first_id, true).unwrap();

        // Force the first page out through the replacer.
        let mut ids = Vec::new();
        for _ in 0..2 {
            let (page_id, _) = pool.new_page().unwrap();
            ids.push(page_id);
        }
        for page_id in ids {
            pool.unpin_page(page_id, false).unwrap();
        }

        let fetched = pool.fetch_page(first_id).unwrap();
        assert_eq!(&fetched.data().read()[0..4], b"keep");
        pool.unpin_page(first_id, false).unwrap();
    }

    #[test]
    fn test_flush_clears_dirty_bit() {
        let (pool, _file) = test_pool(2);
        let (page_id, page) = pool.new_page().unwrap();
        assert!(page.is_dirty());

        pool.flush_page(page_id).unwrap();
        assert!(!page.is_dirty());
        pool.unpin_page(page_id, false).unwrap();
    }

    #[test]
    fn test_delete_page() {
        let (pool, _file) = test_pool(2);
        let (page_id, _page) = pool.new_page().unwrap();

        assert!(matches!(
            pool.delete_page(page_id),
            Err(BufferPoolError::PagePinned(_))
        ));

        pool.unpin_page(page_id, false).unwrap();
        pool.delete_page(page_id).unwrap();
        // Deleting an absent page succeeds.
        pool.delete_page(page_id).unwrap();
        assert!(matches!(
            pool.unpin_page(page_id, false),
            Err(BufferPoolError::PageNotFound(_))
        ));
    }
}
