use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::common::sync::RwLatch;
use crate::common::types::PageId;
use crate::index::hash::error::IndexError;
use crate::storage::buffer::{BufferPool, BufferPoolError};
use crate::storage::page::hash_bucket::{
    BucketInsert, BucketLayout, FixedCodec, HashBucketView, HashBucketViewMut,
};
use crate::storage::page::hash_directory::{HashDirectoryView, HashDirectoryViewMut, MAX_DEPTH};
use crate::storage::page::Page;

/// Backoff between retries when the buffer pool is transiently full.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// A disk-backed extendible hash table on top of the buffer pool.
///
/// One directory page maps hashed keys to bucket pages; buckets split as
/// they fill and merge back as they empty, growing and shrinking the
/// directory's global depth. Non-unique keys are supported; the exact
/// (key, value) pair is unique.
///
/// Concurrency: a table-level latch taken shared by every operation (held
/// exclusively only during construction), page latches underneath, and lock
/// coupling on the directory-to-bucket step - the bucket latch is always
/// acquired before the directory latch is released.
pub struct ExtendibleHashTable<K, V> {
    directory_page_id: PageId,
    buffer_pool: Arc<dyn BufferPool>,
    table_latch: RwLatch<()>,
    hash_fn: Box<dyn Fn(&K) -> u32 + Send + Sync>,
    _marker: PhantomData<fn(K, V)>,
}

/// Fetch a page, treating a full pool as a transient condition.
fn fetch_page_retry(pool: &dyn BufferPool, page_id: PageId) -> Result<Arc<Page>, IndexError> {
    loop {
        match pool.fetch_page(page_id) {
            Ok(page) => return Ok(page),
            Err(BufferPoolError::PoolExhausted) => {
                warn!("buffer pool full while fetching page {} for the hash table, retrying", page_id);
                std::thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Allocate a page, treating a full pool as a transient condition.
fn new_page_retry(pool: &dyn BufferPool) -> Result<(PageId, Arc<Page>), IndexError> {
    loop {
        match pool.new_page() {
            Ok(created) => return Ok(created),
            Err(BufferPoolError::PoolExhausted) => {
                warn!("buffer pool full while creating a page for the hash table, retrying");
                std::thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl<K: FixedCodec + Hash, V: FixedCodec> ExtendibleHashTable<K, V> {
    /// Create a table hashing keys with the std hasher (deterministic
    /// within a build).
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self, IndexError> {
        Self::with_hash_fn(
            buffer_pool,
            Box::new(|key: &K| {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                hasher.finish() as u32
            }),
        )
    }
}

impl<K: FixedCodec, V: FixedCodec> ExtendibleHashTable<K, V> {
    /// Create a table with an explicit hash function.
    pub fn with_hash_fn(
        buffer_pool: Arc<dyn BufferPool>,
        hash_fn: Box<dyn Fn(&K) -> u32 + Send + Sync>,
    ) -> Result<Self, IndexError> {
        let table = Self {
            directory_page_id: 0,
            buffer_pool,
            table_latch: RwLatch::new(()),
            hash_fn,
            _marker: PhantomData,
        };
        let _table = table.table_latch.write();

        let (directory_page_id, dir_page) = new_page_retry(&*table.buffer_pool)?;
        let (bucket_page_id, _bucket_page) = new_page_retry(&*table.buffer_pool)?;
        table.buffer_pool.unpin_page(bucket_page_id, true)?;

        {
            let mut dir_data = dir_page.data().write();
            let mut dir = HashDirectoryViewMut::new(&mut *dir_data);
            dir.init(bucket_page_id);
            dir_page.mark_dirty();
        }
        table.buffer_pool.unpin_page(directory_page_id, true)?;

        drop(_table);
        Ok(Self {
            directory_page_id,
            ..table
        })
    }

    fn hash(&self, key: &K) -> u32 {
        (self.hash_fn)(key)
    }

    /// Look up every value stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, IndexError> {
        let _table = self.table_latch.read();

        let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
        let dir_data = dir_page.data().read();
        let bucket_page_id = {
            let dir = HashDirectoryView::new(&*dir_data);
            dir.bucket_page_id((self.hash(key) & dir.global_depth_mask()) as usize)
        };

        // Lock coupling: take the bucket latch before giving up the
        // directory latch.
        let bucket_page = fetch_page_retry(&*self.buffer_pool, bucket_page_id)?;
        let bucket_data = bucket_page.data().read();
        drop(dir_data);
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        let result = HashBucketView::<K, V>::new(&*bucket_data).get_value(key);
        drop(bucket_data);
        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        Ok(result)
    }

    /// Insert a (key, value) pair. `Ok(false)` means the exact pair already
    /// exists; `DirectoryFull` means the table cannot grow any further.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        let need_split;
        let mut inserted = false;
        {
            let _table = self.table_latch.read();

            let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
            let dir_data = dir_page.data().read();
            let bucket_page_id = {
                let dir = HashDirectoryView::new(&*dir_data);
                dir.bucket_page_id((self.hash(key) & dir.global_depth_mask()) as usize)
            };

            let bucket_page = fetch_page_retry(&*self.buffer_pool, bucket_page_id)?;
            let mut bucket_data = bucket_page.data().write();
            drop(dir_data);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;

            let mut bucket = HashBucketViewMut::<K, V>::new(&mut *bucket_data);
            if bucket.view().is_full() {
                need_split = true;
            } else {
                need_split = false;
                inserted = matches!(bucket.insert(key, value), BucketInsert::Inserted);
                if inserted {
                    bucket_page.mark_dirty();
                }
            }
            drop(bucket_data);
            self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
        }

        if need_split {
            self.split_insert(key, value)
        } else {
            Ok(inserted)
        }
    }

    /// Insert with bucket splitting, repeating when a split leaves the
    /// target bucket full (everything rehashed to one side).
    fn split_insert(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        loop {
            let _table = self.table_latch.read();

            let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
            let mut dir_data = dir_page.data().write();
            let (bucket_idx, bucket_page_id) = {
                let dir = HashDirectoryView::new(&*dir_data);
                let idx = (self.hash(key) & dir.global_depth_mask()) as usize;
                (idx, dir.bucket_page_id(idx))
            };

            let bucket_page = fetch_page_retry(&*self.buffer_pool, bucket_page_id)?;
            let mut bucket_data = bucket_page.data().write();

            if !HashBucketView::<K, V>::new(&*bucket_data).is_full() {
                // Someone has already split this bucket for us.
                drop(dir_data);
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;

                let mut bucket = HashBucketViewMut::<K, V>::new(&mut *bucket_data);
                let inserted = matches!(bucket.insert(key, value), BucketInsert::Inserted);
                if inserted {
                    bucket_page.mark_dirty();
                }
                drop(bucket_data);
                self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                return Ok(inserted);
            }

            let high_bit;
            {
                let mut dir = HashDirectoryViewMut::new(&mut *dir_data);
                if dir.view().local_depth(bucket_idx) == dir.view().global_depth() {
                    if dir.view().global_depth() == MAX_DEPTH {
                        drop(dir);
                        drop(bucket_data);
                        drop(dir_data);
                        self.buffer_pool.unpin_page(bucket_page_id, false)?;
                        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                        return Err(IndexError::DirectoryFull);
                    }
                    dir.incr_global_depth();
                }
                high_bit = dir.view().local_high_bit(bucket_idx) as usize;
            }

            let (split_page_id, split_page) = new_page_retry(&*self.buffer_pool)?;
            {
                // Deepen every alias of the split bucket; the aliases with
                // the high bit set move to the new page. With local depth
                // equal to global depth this is exactly the (index,
                // index | high_bit) pair.
                let mut dir = HashDirectoryViewMut::new(&mut *dir_data);
                let low_bits = bucket_idx & (high_bit - 1);
                for idx in 0..dir.view().size() {
                    if idx & (high_bit - 1) == low_bits {
                        dir.incr_local_depth(idx);
                        if idx & high_bit != 0 {
                            dir.set_bucket_page_id(idx, split_page_id);
                        }
                    }
                }
            }
            dir_page.mark_dirty();

            // Latch the fresh bucket, then let the directory go.
            let mut split_data = split_page.data().write();
            drop(dir_data);
            self.buffer_pool.unpin_page(self.directory_page_id, true)?;

            // Rehash: pairs whose hash carries the new high bit move over.
            let mut bucket = HashBucketViewMut::<K, V>::new(&mut *bucket_data);
            let mut split_bucket = HashBucketViewMut::<K, V>::new(&mut *split_data);
            let mut moved = 0usize;
            for idx in 0..BucketLayout::<K, V>::CAPACITY {
                if !bucket.view().is_readable(idx) {
                    continue;
                }
                let k = bucket.view().key_at(idx);
                if self.hash(&k) as usize & high_bit == 0 {
                    continue;
                }
                let v = bucket.view().value_at(idx);
                bucket.remove_at(idx);
                split_bucket.put_at(moved, &k, &v);
                moved += 1;
            }

            let outcome = if self.hash(key) as usize & high_bit != 0 {
                split_bucket.insert(key, value)
            } else if moved > 0 {
                bucket.insert(key, value)
            } else {
                // Nothing left the original bucket and the key belongs
                // there too: split again at the next depth.
                BucketInsert::Full
            };

            bucket_page.mark_dirty();
            split_page.mark_dirty();
            drop(split_data);
            drop(bucket_data);
            self.buffer_pool.unpin_page(split_page_id, true)?;
            self.buffer_pool.unpin_page(bucket_page_id, true)?;

            match outcome {
                BucketInsert::Inserted => return Ok(true),
                BucketInsert::DuplicatePair => return Ok(false),
                BucketInsert::Full => continue,
            }
        }
    }

    /// Remove the exact (key, value) pair, merging the bucket away if the
    /// removal left it empty.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        let removed;
        let need_merge;
        {
            let _table = self.table_latch.read();

            let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
            let dir_data = dir_page.data().read();
            let bucket_page_id = {
                let dir = HashDirectoryView::new(&*dir_data);
                dir.bucket_page_id((self.hash(key) & dir.global_depth_mask()) as usize)
            };

            let bucket_page = fetch_page_retry(&*self.buffer_pool, bucket_page_id)?;
            let mut bucket_data = bucket_page.data().write();
            drop(dir_data);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;

            let mut bucket = HashBucketViewMut::<K, V>::new(&mut *bucket_data);
            removed = bucket.remove(key, value);
            need_merge = bucket.view().is_empty();
            if removed {
                bucket_page.mark_dirty();
            }
            drop(bucket_data);
            self.buffer_pool.unpin_page(bucket_page_id, removed)?;
        }

        if need_merge {
            self.merge(key)?;
        }
        Ok(removed)
    }

    /// Fold an empty bucket into its split image, cascading while the image
    /// chain stays empty and shrinking the directory when possible.
    fn merge(&self, key: &K) -> Result<(), IndexError> {
        let mut reclaimed = Vec::new();
        {
            let _table = self.table_latch.read();

            let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
            let mut dir_data = dir_page.data().write();
            let mut modified = false;

            loop {
                let (bucket_idx, local_depth, bucket_page_id) = {
                    let dir = HashDirectoryView::new(&*dir_data);
                    let idx = (self.hash(key) & dir.global_depth_mask()) as usize;
                    (idx, dir.local_depth(idx), dir.bucket_page_id(idx))
                };
                if local_depth == 0 {
                    break;
                }

                // The bucket may have been refilled since the remove saw it
                // empty; re-check under its latch.
                let bucket_page = fetch_page_retry(&*self.buffer_pool, bucket_page_id)?;
                let is_empty = {
                    let bucket_data = bucket_page.data().read();
                    HashBucketView::<K, V>::new(&*bucket_data).is_empty()
                };
                self.buffer_pool.unpin_page(bucket_page_id, false)?;
                if !is_empty {
                    break;
                }

                let high_bit = 1usize << (local_depth - 1);
                let split_idx = bucket_idx ^ high_bit;
                let (split_depth, split_page_id) = {
                    let dir = HashDirectoryView::new(&*dir_data);
                    (dir.local_depth(split_idx), dir.bucket_page_id(split_idx))
                };
                if split_depth != local_depth {
                    break;
                }

                {
                    // Every alias of the merged pair (all indices sharing
                    // the low local_depth-1 bits, however many there are)
                    // now points at the split image one level up.
                    let mut dir = HashDirectoryViewMut::new(&mut *dir_data);
                    let low_bits = bucket_idx & (high_bit - 1);
                    for idx in 0..dir.view().size() {
                        if idx & (high_bit - 1) == low_bits {
                            dir.set_bucket_page_id(idx, split_page_id);
                            dir.set_local_depth(idx, local_depth - 1);
                        }
                    }
                    while dir.view().can_shrink() {
                        dir.decr_global_depth();
                    }
                }
                modified = true;
                reclaimed.push(bucket_page_id);
                // The key now routes to the split image; if that one is
                // empty as well the next round merges it too.
            }

            if modified {
                dir_page.mark_dirty();
            }
            drop(dir_data);
            self.buffer_pool.unpin_page(self.directory_page_id, modified)?;
        }

        // Nobody can reach these pages through the directory anymore.
        for page_id in reclaimed {
            if let Err(e) = self.buffer_pool.delete_page(page_id) {
                warn!("could not reclaim merged bucket page {}: {}", page_id, e);
            }
        }
        Ok(())
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32, IndexError> {
        let _table = self.table_latch.read();

        let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
        let depth = {
            let dir_data = dir_page.data().read();
            HashDirectoryView::new(&*dir_data).global_depth()
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(depth)
    }

    /// Assert the directory invariants; panics on a violation.
    pub fn verify_integrity(&self) -> Result<(), IndexError> {
        let _table = self.table_latch.read();

        let dir_page = fetch_page_retry(&*self.buffer_pool, self.directory_page_id)?;
        {
            let dir_data = dir_page.data().read();
            HashDirectoryView::new(&*dir_data).verify_integrity();
        }
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(())
    }
}
