use std::sync::Arc;

use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPool, BufferPoolError};
use crate::storage::page::heap::{HeapPageView, HeapPageViewMut};
use crate::storage::page::PageError;
use crate::storage::table::iterator::TableIterator;
use crate::storage::table::tuple::Tuple;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple {0} not found")]
    TupleNotFound(Rid),

    #[error("Tuple serialization failed: {0}")]
    Serialization(String),
}

/// A table stored as a doubly-linked chain of slotted heap pages.
///
/// Deletes are two-phased: `mark_delete` hides the tuple but keeps its bytes
/// so an abort can `rollback_delete`; `apply_delete` frees the slot for good
/// at commit. Slots are never reused, which keeps rids stable.
pub struct TableHeap {
    buffer_pool: Arc<dyn BufferPool>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create a table with one empty page.
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self, TableError> {
        let (first_page_id, page) = buffer_pool.new_page()?;
        {
            let mut data = page.data().write();
            HeapPageViewMut::new(&mut *data).init();
            page.mark_dirty();
        }
        buffer_pool.unpin_page(first_page_id, true)?;

        Ok(Self {
            buffer_pool,
            first_page_id,
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub(crate) fn buffer_pool(&self) -> &Arc<dyn BufferPool> {
        &self.buffer_pool
    }

    /// Insert a tuple at the first page of the chain with room, appending a
    /// new page when every page is full.
    pub fn insert_tuple(&self, tuple: &Tuple) -> Result<Rid, TableError> {
        let record = bincode::serialize(tuple).map_err(|e| TableError::Serialization(e.to_string()))?;

        let mut page_id = self.first_page_id;
        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let mut data = page.data().write();
            let mut heap_page = HeapPageViewMut::new(&mut *data);

            match heap_page.insert_record(&record) {
                Ok(slot_num) => {
                    page.mark_dirty();
                    drop(data);
                    self.buffer_pool.unpin_page(page_id, true)?;
                    return Ok(Rid::new(page_id, slot_num));
                }
                Err(PageError::InsufficientSpace) => {}
                Err(e) => {
                    drop(data);
                    self.buffer_pool.unpin_page(page_id, false)?;
                    return Err(e.into());
                }
            }

            let next_page_id = heap_page.view().next_page_id();
            if next_page_id != INVALID_PAGE_ID {
                drop(data);
                self.buffer_pool.unpin_page(page_id, false)?;
                page_id = next_page_id;
                continue;
            }

            // End of the chain: link a fresh page while still holding the
            // current page's latch so nobody links a competing page.
            let (new_page_id, new_page) = self.buffer_pool.new_page()?;
            let mut new_data = new_page.data().write();
            let mut new_heap_page = HeapPageViewMut::new(&mut *new_data);
            new_heap_page.init();
            new_heap_page.set_prev_page_id(page_id);
            let slot_num = new_heap_page.insert_record(&record)?;
            new_page.mark_dirty();

            heap_page.set_next_page_id(new_page_id);
            page.mark_dirty();

            drop(new_data);
            drop(data);
            self.buffer_pool.unpin_page(new_page_id, true)?;
            self.buffer_pool.unpin_page(page_id, true)?;
            return Ok(Rid::new(new_page_id, slot_num));
        }
    }

    /// Read a live tuple.
    pub fn get_tuple(&self, rid: Rid) -> Result<Tuple, TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let data = page.data().read();
            HeapPageView::new(&*data)
                .record(rid.slot_num)
                .map(Tuple::from_bytes)
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;

        match result {
            Some(Ok(tuple)) => Ok(tuple),
            Some(Err(e)) => Err(TableError::Serialization(e.to_string())),
            None => Err(TableError::TupleNotFound(rid)),
        }
    }

    /// Hide the tuple, keeping its bytes for a possible rollback.
    pub fn mark_delete(&self, rid: Rid) -> Result<(), TableError> {
        self.with_page_mut(rid, |heap_page| heap_page.mark_delete(rid.slot_num))
    }

    /// Undo a `mark_delete` during transaction abort.
    pub fn rollback_delete(&self, rid: Rid) -> Result<(), TableError> {
        self.with_page_mut(rid, |heap_page| heap_page.rollback_delete(rid.slot_num))
    }

    /// Free a delete-marked slot for good at commit.
    pub fn apply_delete(&self, rid: Rid) -> Result<(), TableError> {
        self.with_page_mut(rid, |heap_page| heap_page.apply_delete(rid.slot_num))
    }

    /// Overwrite a tuple in place. `InsufficientSpace` bubbles up when the
    /// new version does not fit, so the caller can delete + reinsert.
    pub fn update_tuple(&self, rid: Rid, tuple: &Tuple) -> Result<(), TableError> {
        let record = bincode::serialize(tuple).map_err(|e| TableError::Serialization(e.to_string()))?;
        self.with_page_mut(rid, |heap_page| heap_page.update_record(rid.slot_num, &record))
    }

    /// Iterate the live tuples of this table in page-chain order.
    pub fn iter(self: &Arc<Self>) -> TableIterator {
        TableIterator::new(Arc::clone(self))
    }

    fn with_page_mut(
        &self,
        rid: Rid,
        op: impl FnOnce(&mut HeapPageViewMut<'_>) -> Result<(), PageError>,
    ) -> Result<(), TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut data = page.data().write();
            let mut heap_page = HeapPageViewMut::new(&mut *data);
            let result = op(&mut heap_page);
            if result.is_ok() {
                page.mark_dirty();
            }
            result
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result.map_err(Into::into)
    }
}
