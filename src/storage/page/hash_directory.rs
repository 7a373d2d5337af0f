use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::PageId;

/// Maximum directory depth; the directory holds `2^MAX_DEPTH` entry slots.
pub const MAX_DEPTH: u32 = 9;

/// Number of entry slots persisted in a directory page.
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_DEPTH;

// Directory page layout:
//   [0..4)      LSN (reserved)
//   [4..8)      global depth (u32)
//   [8..2056)   bucket page ids (i32 each)
//   [2056..2568) local depths (u8 each)
const GLOBAL_DEPTH_OFFSET: usize = 4;
const BUCKET_PAGE_IDS_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = BUCKET_PAGE_IDS_OFFSET + DIRECTORY_ARRAY_SIZE * 4;

/// Read-only view of a hash directory page.
pub struct HashDirectoryView<'a> {
    data: &'a [u8],
}

impl<'a> HashDirectoryView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn global_depth(&self) -> u32 {
        LittleEndian::read_u32(&self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4])
    }

    /// A mask with exactly `global_depth` low bits set.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Number of live directory entries.
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        LittleEndian::read_i32(&self.data[offset..offset + 4])
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + idx] as u32
    }

    /// The bit distinguishing a bucket from the image it would split into.
    pub fn local_high_bit(&self, idx: usize) -> u32 {
        1 << self.local_depth(idx)
    }

    /// The directory can shrink when no entry uses the full global depth.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth() == 0 {
            return false;
        }
        let global_depth = self.global_depth();
        (0..self.size()).all(|idx| self.local_depth(idx) < global_depth)
    }

    /// Check the structural invariants of the directory, panicking on a
    /// violation. Intended for tests.
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        assert!(global_depth <= MAX_DEPTH);
        for idx in 0..self.size() {
            let local_depth = self.local_depth(idx);
            assert!(
                local_depth <= global_depth,
                "local depth {} exceeds global depth {} at index {}",
                local_depth,
                global_depth,
                idx
            );
            // Every index sharing the low local_depth bits must share the
            // bucket page.
            let twin = idx % (1 << local_depth);
            assert_eq!(
                self.bucket_page_id(idx),
                self.bucket_page_id(twin),
                "aliased entries {} and {} disagree",
                idx,
                twin
            );
            assert_eq!(self.local_depth(idx), self.local_depth(twin));
        }
    }
}

/// Mutable view of a hash directory page.
pub struct HashDirectoryViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HashDirectoryViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn view(&self) -> HashDirectoryView<'_> {
        HashDirectoryView { data: self.data }
    }

    /// Initialize an empty directory: depth zero, one bucket.
    pub fn init(&mut self, first_bucket_page_id: PageId) {
        self.set_global_depth(0);
        self.set_bucket_page_id(0, first_bucket_page_id);
        self.set_local_depth(0, 0);
    }

    pub fn set_global_depth(&mut self, depth: u32) {
        debug_assert!(depth <= MAX_DEPTH);
        LittleEndian::write_u32(&mut self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4], depth);
    }

    /// Double the directory: the new upper half mirrors the lower half.
    pub fn incr_global_depth(&mut self) {
        let old_size = self.view().size();
        debug_assert!(old_size * 2 <= DIRECTORY_ARRAY_SIZE);
        for idx in 0..old_size {
            let page_id = self.view().bucket_page_id(idx);
            let local_depth = self.view().local_depth(idx);
            self.set_bucket_page_id(old_size + idx, page_id);
            self.set_local_depth(old_size + idx, local_depth);
        }
        let depth = self.view().global_depth();
        self.set_global_depth(depth + 1);
    }

    pub fn decr_global_depth(&mut self) {
        let depth = self.view().global_depth();
        debug_assert!(depth > 0);
        self.set_global_depth(depth - 1);
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        LittleEndian::write_i32(&mut self.data[offset..offset + 4], page_id);
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u32) {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        debug_assert!(depth <= MAX_DEPTH);
        self.data[LOCAL_DEPTHS_OFFSET + idx] = depth as u8;
    }

    pub fn incr_local_depth(&mut self, idx: usize) {
        let depth = self.view().local_depth(idx);
        self.set_local_depth(idx, depth + 1);
    }

    pub fn decr_local_depth(&mut self, idx: usize) {
        let depth = self.view().local_depth(idx);
        debug_assert!(depth > 0);
        self.set_local_depth(idx, depth - 1);
    }
}
