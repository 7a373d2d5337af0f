use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, SlotNum, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::page::error::PageError;

// Heap page layout:
//   [0..4)   LSN (reserved)
//   [4..8)   next page id (i32)
//   [8..12)  prev page id (i32)
//   [12..16) slot count (u32)
//   [16..20) free space offset (u32)
// Record bytes grow up from the header; the slot array grows down from the
// page end, one (offset, length) pair per slot.
const NEXT_PAGE_OFFSET: usize = 4;
const PREV_PAGE_OFFSET: usize = 8;
const SLOT_COUNT_OFFSET: usize = 12;
const FREE_SPACE_OFFSET: usize = 16;
const HEADER_SIZE: usize = 20;

const SLOT_ENTRY_SIZE: usize = 8;

/// High bit of a slot's length word: the record is delete-marked but its
/// bytes are kept so an aborting transaction can roll the delete back.
const DELETE_MASK: u32 = 1 << 31;

/// Read-only view of a slotted heap page.
pub struct HeapPageView<'a> {
    data: &'a [u8],
}

impl<'a> HeapPageView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn next_page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4])
    }

    pub fn prev_page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[PREV_PAGE_OFFSET..PREV_PAGE_OFFSET + 4])
    }

    pub fn slot_count(&self) -> u32 {
        LittleEndian::read_u32(&self.data[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 4])
    }

    pub fn free_space_offset(&self) -> u32 {
        LittleEndian::read_u32(&self.data[FREE_SPACE_OFFSET..FREE_SPACE_OFFSET + 4])
    }

    fn slot(&self, slot_num: SlotNum) -> (u32, u32) {
        let pos = PAGE_SIZE - SLOT_ENTRY_SIZE * (slot_num as usize + 1);
        let offset = LittleEndian::read_u32(&self.data[pos..pos + 4]);
        let length = LittleEndian::read_u32(&self.data[pos + 4..pos + 8]);
        (offset, length)
    }

    pub fn is_delete_marked(&self, slot_num: SlotNum) -> bool {
        let (_, length) = self.slot(slot_num);
        length & DELETE_MASK != 0
    }

    /// The live record bytes in a slot, or None for a freed, empty or
    /// delete-marked slot.
    pub fn record(&self, slot_num: SlotNum) -> Option<&'a [u8]> {
        if slot_num >= self.slot_count() {
            return None;
        }
        let (offset, length) = self.slot(slot_num);
        if length == 0 || length & DELETE_MASK != 0 {
            return None;
        }
        Some(&self.data[offset as usize..(offset + length) as usize])
    }
}

/// Mutable view of a slotted heap page.
pub struct HeapPageViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeapPageViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn view(&self) -> HeapPageView<'_> {
        HeapPageView { data: self.data }
    }

    /// Initialize a fresh heap page with no records and no neighbours.
    pub fn init(&mut self) {
        self.data[..HEADER_SIZE].fill(0);
        self.set_next_page_id(INVALID_PAGE_ID);
        self.set_prev_page_id(INVALID_PAGE_ID);
        self.set_slot_count(0);
        self.set_free_space_offset(HEADER_SIZE as u32);
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4], page_id);
    }

    pub fn set_prev_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data[PREV_PAGE_OFFSET..PREV_PAGE_OFFSET + 4], page_id);
    }

    fn set_slot_count(&mut self, count: u32) {
        LittleEndian::write_u32(&mut self.data[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 4], count);
    }

    fn set_free_space_offset(&mut self, offset: u32) {
        LittleEndian::write_u32(&mut self.data[FREE_SPACE_OFFSET..FREE_SPACE_OFFSET + 4], offset);
    }

    fn write_slot(&mut self, slot_num: SlotNum, offset: u32, length: u32) {
        let pos = PAGE_SIZE - SLOT_ENTRY_SIZE * (slot_num as usize + 1);
        LittleEndian::write_u32(&mut self.data[pos..pos + 4], offset);
        LittleEndian::write_u32(&mut self.data[pos + 4..pos + 8], length);
    }

    /// Append a record, returning its slot number, or `InsufficientSpace`.
    pub fn insert_record(&mut self, record: &[u8]) -> Result<SlotNum, PageError> {
        let slot_count = self.view().slot_count();
        let free_offset = self.view().free_space_offset();

        let slot_array_start = PAGE_SIZE - SLOT_ENTRY_SIZE * (slot_count as usize + 1);
        if free_offset as usize + record.len() > slot_array_start {
            return Err(PageError::InsufficientSpace);
        }

        let end = free_offset as usize + record.len();
        self.data[free_offset as usize..end].copy_from_slice(record);
        self.write_slot(slot_count, free_offset, record.len() as u32);
        self.set_slot_count(slot_count + 1);
        self.set_free_space_offset(end as u32);
        Ok(slot_count)
    }

    /// Set the delete mark, keeping the bytes for rollback.
    pub fn mark_delete(&mut self, slot_num: SlotNum) -> Result<(), PageError> {
        let (offset, length) = self.checked_slot(slot_num)?;
        if length == 0 {
            return Err(PageError::RecordNotFound);
        }
        self.write_slot(slot_num, offset, length | DELETE_MASK);
        Ok(())
    }

    /// Clear the delete mark, resurrecting the record.
    pub fn rollback_delete(&mut self, slot_num: SlotNum) -> Result<(), PageError> {
        let (offset, length) = self.checked_slot(slot_num)?;
        if length == 0 {
            return Err(PageError::RecordNotFound);
        }
        self.write_slot(slot_num, offset, length & !DELETE_MASK);
        Ok(())
    }

    /// Free the slot for good. The record bytes are abandoned in place; the
    /// slot itself is never reused so rids stay stable.
    pub fn apply_delete(&mut self, slot_num: SlotNum) -> Result<(), PageError> {
        let (_, length) = self.checked_slot(slot_num)?;
        if length == 0 {
            return Err(PageError::RecordNotFound);
        }
        self.write_slot(slot_num, 0, 0);
        Ok(())
    }

    /// Overwrite a record in place. Only an exact-size replacement fits;
    /// anything else reports `InsufficientSpace` so the caller falls back
    /// to delete + reinsert. Keeping the slot length fixed also means an
    /// aborted update can always be rolled back in place.
    pub fn update_record(&mut self, slot_num: SlotNum, record: &[u8]) -> Result<(), PageError> {
        let (offset, length) = self.checked_slot(slot_num)?;
        if length == 0 || length & DELETE_MASK != 0 {
            return Err(PageError::RecordNotFound);
        }
        if record.len() != length as usize {
            return Err(PageError::InsufficientSpace);
        }
        let start = offset as usize;
        self.data[start..start + record.len()].copy_from_slice(record);
        Ok(())
    }

    fn checked_slot(&self, slot_num: SlotNum) -> Result<(u32, u32), PageError> {
        if slot_num >= self.view().slot_count() {
            return Err(PageError::InvalidSlot(slot_num));
        }
        Ok(self.view().slot(slot_num))
    }
}
