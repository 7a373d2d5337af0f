use crate::common::sync::spinlock::SpinGuard;
use crate::common::sync::{RwLatch, SpinLock};
use crate::common::types::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Raw page contents, guarded by the frame's reader/writer latch.
pub type PageData = [u8; PAGE_SIZE];

/// Book-keeping the buffer pool maintains for a frame.
///
/// Every read or write of these fields must happen through the metadata
/// spin lock; the fields are intentionally only reachable via
/// [`Page::meta`].
pub struct PageMeta {
    pub page_id: PageId,
    pub pin_count: i32,
    pub is_dirty: bool,
    /// Set when someone dirtied the page while a flush was mid-flight, so
    /// the flusher knows not to clear `is_dirty` behind the writer's back.
    pub just_dirtied: bool,
}

impl PageMeta {
    /// Re-point the frame at a new page. The frame comes from the free list
    /// or the replacer, so it is not in the replacer and starts pinned.
    pub fn reset_for(&mut self, page_id: PageId) {
        self.page_id = page_id;
        self.pin_count = 1;
        self.is_dirty = false;
        self.just_dirtied = false;
    }
}

/// A buffer pool frame: one page worth of bytes plus its metadata.
///
/// The metadata spin lock and the content latch are deliberately separate so
/// an operator can hold the content latch for a long read without blocking
/// pin-count traffic on the same frame.
pub struct Page {
    meta: SpinLock<PageMeta>,
    data: RwLatch<PageData>,
}

impl Page {
    pub fn new() -> Self {
        Self {
            meta: SpinLock::new(PageMeta {
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
                just_dirtied: false,
            }),
            data: RwLatch::new([0u8; PAGE_SIZE]),
        }
    }

    /// Lock and return the page metadata.
    pub fn meta(&self) -> SpinGuard<'_, PageMeta> {
        self.meta.lock()
    }

    /// The content latch. Readers of page bytes take `data().read()`,
    /// mutators take `data().write()`.
    pub fn data(&self) -> &RwLatch<PageData> {
        &self.data
    }

    /// Snapshot of the current page id.
    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    /// Snapshot of the current pin count.
    pub fn pin_count(&self) -> i32 {
        self.meta.lock().pin_count
    }

    /// Snapshot of the dirty flag.
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    /// Mark the page dirty after modifying its contents.
    ///
    /// Callers must hold the page's write latch; the pin count must be
    /// positive because the caller holds the page.
    pub fn mark_dirty(&self) {
        let mut meta = self.meta.lock();
        debug_assert!(meta.pin_count > 0);
        meta.is_dirty = true;
        meta.just_dirtied = true;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_page_is_zeroed_and_unpinned() {
        let page = Page::new();
        assert_eq!(page.page_id(), INVALID_PAGE_ID);
        assert_eq!(page.pin_count(), 0);
        assert!(!page.is_dirty());
        assert!(page.data().read().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mark_dirty_sets_both_flags() {
        let page = Page::new();
        page.meta().reset_for(3);
        page.mark_dirty();

        let meta = page.meta();
        assert!(meta.is_dirty);
        assert!(meta.just_dirtied);
        assert_eq!(meta.page_id, 3);
        assert_eq!(meta.pin_count, 1);
    }
}
