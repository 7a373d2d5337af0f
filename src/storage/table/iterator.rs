use std::sync::Arc;

use crate::common::types::{PageId, Rid, SlotNum, INVALID_PAGE_ID};
use crate::storage::page::heap::HeapPageView;
use crate::storage::table::heap::{TableError, TableHeap};
use crate::storage::table::tuple::Tuple;

/// Iterator over the live tuples of a table heap, in page-chain order.
///
/// Delete-marked and freed slots are skipped. Each step pins the current
/// page only for the duration of the slot scan.
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: PageId,
    slot_num: SlotNum,
}

impl TableIterator {
    pub fn new(heap: Arc<TableHeap>) -> Self {
        let page_id = heap.first_page_id();
        Self {
            heap,
            page_id,
            slot_num: 0,
        }
    }
}

impl Iterator for TableIterator {
    type Item = Result<(Tuple, Rid), TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }

            let page = match self.heap.buffer_pool().fetch_page(self.page_id) {
                Ok(page) => page,
                Err(e) => return Some(Err(e.into())),
            };

            let step = {
                let data = page.data().read();
                let heap_page = HeapPageView::new(&*data);
                let mut found = None;
                while self.slot_num < heap_page.slot_count() {
                    let slot_num = self.slot_num;
                    self.slot_num += 1;
                    if let Some(record) = heap_page.record(slot_num) {
                        found = Some((record.to_vec(), slot_num));
                        break;
                    }
                }
                match found {
                    Some(found) => Ok(found),
                    None => Err(heap_page.next_page_id()),
                }
            };

            if let Err(e) = self.heap.buffer_pool().unpin_page(self.page_id, false) {
                return Some(Err(e.into()));
            }

            match step {
                Ok((record, slot_num)) => {
                    let rid = Rid::new(self.page_id, slot_num);
                    return Some(
                        Tuple::from_bytes(&record)
                            .map(|tuple| (tuple, rid))
                            .map_err(|e| TableError::Serialization(e.to_string())),
                    );
                }
                Err(next_page_id) => {
                    self.page_id = next_page_id;
                    self.slot_num = 0;
                }
            }
        }
    }
}
