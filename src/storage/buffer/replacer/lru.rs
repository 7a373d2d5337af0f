use log::warn;
use parking_lot::RwLock;

use crate::common::types::FrameId;

/// A node in the arena-backed LRU list. `prev`/`next` are arena indices;
/// the sentinel occupies the slot past the last frame.
#[derive(Clone, Copy)]
struct LruNode {
    prev: usize,
    next: usize,
    in_list: bool,
}

struct LruList {
    /// One slot per frame id, plus the sentinel at index `num_frames`.
    slots: Vec<LruNode>,
    sentinel: usize,
    count: usize,
}

impl LruList {
    fn new(num_frames: usize) -> Self {
        let sentinel = num_frames;
        let mut slots = vec![
            LruNode {
                prev: sentinel,
                next: sentinel,
                in_list: false,
            };
            num_frames + 1
        ];
        slots[sentinel].prev = sentinel;
        slots[sentinel].next = sentinel;
        Self {
            slots,
            sentinel,
            count: 0,
        }
    }

    /// Splice the node in right after the sentinel (the MRU end).
    fn insert_mru(&mut self, idx: usize) {
        let head_next = self.slots[self.sentinel].next;
        self.slots[idx].prev = self.sentinel;
        self.slots[idx].next = head_next;
        self.slots[head_next].prev = idx;
        self.slots[self.sentinel].next = idx;
        self.slots[idx].in_list = true;
        self.count += 1;
    }

    fn remove(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
        self.slots[idx].in_list = false;
        self.count -= 1;
    }
}

/// LRU replacement policy over buffer pool frames.
///
/// The list is kept in MRU-to-LRU order: `unpin` inserts at the MRU end and
/// `victim` pops the LRU end (the node before the sentinel). Lookup by frame
/// id is O(1) through the arena, so every operation is O(1).
pub struct LRUReplacer {
    num_frames: usize,
    list: RwLock<LruList>,
}

impl LRUReplacer {
    /// Create a replacer able to track `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            list: RwLock::new(LruList::new(num_frames)),
        }
    }

    /// A frame became a replacement candidate (its pin count hit zero).
    /// Unpinning a frame that is already present is a no-op.
    pub fn unpin(&self, frame_id: FrameId) {
        if !self.is_id_valid(frame_id) {
            warn!("unpin with invalid frame id = {}", frame_id);
            return;
        }
        let mut list = self.list.write();
        let idx = frame_id as usize;
        if list.slots[idx].in_list {
            warn!("frame {} unpinned more than once", frame_id);
            return;
        }
        list.insert_mru(idx);
    }

    /// A frame was pinned and is no longer a candidate. Pinning a frame that
    /// is not present is a no-op.
    pub fn pin(&self, frame_id: FrameId) {
        if !self.is_id_valid(frame_id) {
            warn!("pin with invalid frame id = {}", frame_id);
            return;
        }
        let mut list = self.list.write();
        let idx = frame_id as usize;
        if !list.slots[idx].in_list {
            return;
        }
        list.remove(idx);
    }

    /// Pop the least recently used frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        let mut list = self.list.write();
        if list.count == 0 {
            return None;
        }
        let idx = list.slots[list.sentinel].prev;
        debug_assert_ne!(idx, list.sentinel);
        list.remove(idx);
        Some(idx as FrameId)
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.list.read().count
    }

    fn is_id_valid(&self, frame_id: FrameId) -> bool {
        frame_id >= 0 && (frame_id as usize) < self.num_frames
    }
}
