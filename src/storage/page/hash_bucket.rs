use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, Rid, PAGE_SIZE};

/// A fixed-width codec for hash index keys and values, written straight
/// into bucket pages.
pub trait FixedCodec: Copy + PartialEq + Send + Sync + 'static {
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl FixedCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl FixedCodec for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl FixedCodec for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl FixedCodec for Rid {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, self.page_id);
        LittleEndian::write_u32(&mut buf[4..], self.slot_num);
    }

    fn decode(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_i32(buf) as PageId,
            slot_num: LittleEndian::read_u32(&buf[4..]),
        }
    }
}

/// Outcome of a bucket-level insert.
#[derive(Debug, PartialEq, Eq)]
pub enum BucketInsert {
    Inserted,
    /// The exact (key, value) pair is already present.
    DuplicatePair,
    /// No free or reclaimable slot left.
    Full,
}

// Bucket page layout:
//   [0..4)  LSN (reserved)
//   occupied bitmap, readable bitmap, then the (key, value) slot array.
//
// A slot with occupied=1, readable=0 is a tombstone: reads skip it, inserts
// may reclaim it.
const BUCKET_DATA_OFFSET: usize = 4;

/// Read-only view of a hash bucket page.
pub struct HashBucketView<'a, K, V> {
    data: &'a [u8],
    _marker: PhantomData<(K, V)>,
}

/// Mutable view of a hash bucket page.
pub struct HashBucketViewMut<'a, K, V> {
    data: &'a mut [u8],
    _marker: PhantomData<(K, V)>,
}

/// Shared layout arithmetic for both views.
pub struct BucketLayout<K, V> {
    _marker: PhantomData<(K, V)>,
}

impl<K: FixedCodec, V: FixedCodec> BucketLayout<K, V> {
    const PAIR_SIZE: usize = K::ENCODED_SIZE + V::ENCODED_SIZE;

    /// Slots per bucket: two bitmap bits plus one pair per slot must fill
    /// at most the space after the reserved header.
    pub const CAPACITY: usize = 4 * (PAGE_SIZE - BUCKET_DATA_OFFSET) / (4 * Self::PAIR_SIZE + 1);

    const BITMAP_LEN: usize = (Self::CAPACITY + 7) / 8;
    const OCCUPIED_OFFSET: usize = BUCKET_DATA_OFFSET;
    const READABLE_OFFSET: usize = Self::OCCUPIED_OFFSET + Self::BITMAP_LEN;
    const ARRAY_OFFSET: usize = Self::READABLE_OFFSET + Self::BITMAP_LEN;

    fn slot_offset(idx: usize) -> usize {
        Self::ARRAY_OFFSET + idx * Self::PAIR_SIZE
    }
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap[idx / 8] & (1 << (idx % 8)) != 0
}

fn set_bit(bitmap: &mut [u8], idx: usize) {
    bitmap[idx / 8] |= 1 << (idx % 8);
}

fn clear_bit(bitmap: &mut [u8], idx: usize) {
    bitmap[idx / 8] &= !(1 << (idx % 8));
}

impl<'a, K: FixedCodec, V: FixedCodec> HashBucketView<'a, K, V> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn occupied_bitmap(&self) -> &[u8] {
        let offset = BucketLayout::<K, V>::OCCUPIED_OFFSET;
        &self.data[offset..offset + BucketLayout::<K, V>::BITMAP_LEN]
    }

    fn readable_bitmap(&self) -> &[u8] {
        let offset = BucketLayout::<K, V>::READABLE_OFFSET;
        &self.data[offset..offset + BucketLayout::<K, V>::BITMAP_LEN]
    }

    pub fn is_occupied(&self, idx: usize) -> bool {
        debug_assert!(idx < BucketLayout::<K, V>::CAPACITY);
        bit_is_set(self.occupied_bitmap(), idx)
    }

    pub fn is_readable(&self, idx: usize) -> bool {
        debug_assert!(idx < BucketLayout::<K, V>::CAPACITY);
        bit_is_set(self.readable_bitmap(), idx)
    }

    pub fn key_at(&self, idx: usize) -> K {
        let offset = BucketLayout::<K, V>::slot_offset(idx);
        K::decode(&self.data[offset..offset + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, idx: usize) -> V {
        let offset = BucketLayout::<K, V>::slot_offset(idx) + K::ENCODED_SIZE;
        V::decode(&self.data[offset..offset + V::ENCODED_SIZE])
    }

    /// All values stored under `key`, in slot order.
    pub fn get_value(&self, key: &K) -> Vec<V> {
        let mut result = Vec::new();
        for idx in 0..BucketLayout::<K, V>::CAPACITY {
            if self.is_readable(idx) && self.key_at(idx) == *key {
                result.push(self.value_at(idx));
            }
        }
        result
    }

    /// Whether every slot holds a readable pair. Walks the readable bitmap
    /// a 64-bit word at a time with a byte tail.
    pub fn is_full(&self) -> bool {
        Self::scan_bitmap(self.readable_bitmap(), BucketLayout::<K, V>::CAPACITY, |word, mask| {
            word & mask == mask
        })
    }

    /// Whether no slot holds a readable pair.
    pub fn is_empty(&self) -> bool {
        Self::scan_bitmap(self.readable_bitmap(), BucketLayout::<K, V>::CAPACITY, |word, mask| {
            word & mask == 0
        })
    }

    /// Number of readable pairs.
    pub fn num_readable(&self) -> usize {
        let bitmap = self.readable_bitmap();
        let capacity = BucketLayout::<K, V>::CAPACITY;
        let full_words = capacity / 64;

        let mut count = 0usize;
        for word_idx in 0..full_words {
            let word = LittleEndian::read_u64(&bitmap[word_idx * 8..word_idx * 8 + 8]);
            count += word.count_ones() as usize;
        }
        for idx in full_words * 64..capacity {
            if bit_is_set(bitmap, idx) {
                count += 1;
            }
        }
        count
    }

    /// Fold the bitmap word-at-a-time: `check(word, mask)` must hold for
    /// every 64-bit stride and for the byte-wise tail.
    fn scan_bitmap(bitmap: &[u8], capacity: usize, check: impl Fn(u64, u64) -> bool) -> bool {
        let full_words = capacity / 64;
        for word_idx in 0..full_words {
            let word = LittleEndian::read_u64(&bitmap[word_idx * 8..word_idx * 8 + 8]);
            if !check(word, u64::MAX) {
                return false;
            }
        }
        let mut idx = full_words * 64;
        while idx < capacity {
            let bits_left = (capacity - idx).min(8);
            let mask = ((1u16 << bits_left) - 1) as u64;
            if !check(bitmap[idx / 8] as u64, mask) {
                return false;
            }
            idx += 8;
        }
        true
    }
}

impl<'a, K: FixedCodec, V: FixedCodec> HashBucketViewMut<'a, K, V> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    pub fn view(&self) -> HashBucketView<'_, K, V> {
        HashBucketView {
            data: self.data,
            _marker: PhantomData,
        }
    }

    /// Insert a pair, reclaiming the first non-readable slot (free or
    /// tombstone). Fails on an exact duplicate pair or a full bucket.
    pub fn insert(&mut self, key: &K, value: &V) -> BucketInsert {
        let mut free_slot = None;
        for idx in 0..BucketLayout::<K, V>::CAPACITY {
            if self.view().is_readable(idx) {
                if self.view().key_at(idx) == *key && self.view().value_at(idx) == *value {
                    return BucketInsert::DuplicatePair;
                }
            } else if free_slot.is_none() {
                free_slot = Some(idx);
            }
        }
        match free_slot {
            Some(idx) => {
                self.put_at(idx, key, value);
                BucketInsert::Inserted
            }
            None => BucketInsert::Full,
        }
    }

    /// Remove the exact pair if present, leaving a tombstone.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        for idx in 0..BucketLayout::<K, V>::CAPACITY {
            if self.view().is_readable(idx)
                && self.view().key_at(idx) == *key
                && self.view().value_at(idx) == *value
            {
                self.remove_at(idx);
                return true;
            }
        }
        false
    }

    /// Clear the readable bit only; the occupied bit stays set so the slot
    /// remains a tombstone.
    pub fn remove_at(&mut self, idx: usize) {
        let offset = BucketLayout::<K, V>::READABLE_OFFSET;
        clear_bit(&mut self.data[offset..offset + BucketLayout::<K, V>::BITMAP_LEN], idx);
    }

    /// Write a pair into a slot and mark it occupied + readable.
    pub fn put_at(&mut self, idx: usize, key: &K, value: &V) {
        debug_assert!(idx < BucketLayout::<K, V>::CAPACITY);
        let slot = BucketLayout::<K, V>::slot_offset(idx);
        key.encode(&mut self.data[slot..slot + K::ENCODED_SIZE]);
        value.encode(&mut self.data[slot + K::ENCODED_SIZE..slot + BucketLayout::<K, V>::PAIR_SIZE]);

        let occupied = BucketLayout::<K, V>::OCCUPIED_OFFSET;
        set_bit(&mut self.data[occupied..occupied + BucketLayout::<K, V>::BITMAP_LEN], idx);
        let readable = BucketLayout::<K, V>::READABLE_OFFSET;
        set_bit(&mut self.data[readable..readable + BucketLayout::<K, V>::BITMAP_LEN], idx);
    }
}
