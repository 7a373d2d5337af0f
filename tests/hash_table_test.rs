use std::sync::Arc;

use anyhow::Result;

use taigadb::index::hash::{ExtendibleHashTable, IndexError};
use taigadb::storage::buffer::BufferPool;

mod common;
use common::create_test_buffer_pool;

fn identity_hash() -> Box<dyn Fn(&i32) -> u32 + Send + Sync> {
    Box::new(|key: &i32| *key as u32)
}

// Capacity of a bucket page holding (i32, i32) pairs.
const BUCKET_CAPACITY: i32 = 496;

#[test]
fn test_sample_insert_get_remove() -> Result<()> {
    let (pool, _file) = create_test_buffer_pool(50)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = ExtendibleHashTable::<i32, i32>::new(pool)?;

    // insert a few values
    for i in 0..5 {
        assert!(ht.insert(&i, &i)?);
        assert_eq!(ht.get_value(&i)?, vec![i]);
    }
    ht.verify_integrity()?;

    // check if the inserted values are all there
    for i in 0..5 {
        assert_eq!(ht.get_value(&i)?, vec![i]);
    }

    // insert one more value for each key
    for i in 0..5 {
        if i == 0 {
            // duplicate pairs are not allowed
            assert!(!ht.insert(&i, &(2 * i))?);
            assert_eq!(ht.get_value(&i)?, vec![0]);
        } else {
            assert!(ht.insert(&i, &(2 * i))?);
            let mut values = ht.get_value(&i)?;
            values.sort_unstable();
            let mut expected = vec![i, 2 * i];
            expected.sort_unstable();
            assert_eq!(values, expected);
        }
    }
    ht.verify_integrity()?;

    // look for a key that does not exist
    assert!(ht.get_value(&20)?.is_empty());

    // delete some values
    for i in 0..5 {
        assert!(ht.remove(&i, &i)?);
        let values = ht.get_value(&i)?;
        if i == 0 {
            // (0, 0) was the only pair with key 0
            assert!(values.is_empty());
        } else {
            assert_eq!(values, vec![2 * i]);
        }
    }
    ht.verify_integrity()?;

    // delete the rest
    for i in 0..5 {
        if i == 0 {
            assert!(!ht.remove(&i, &(2 * i))?);
        } else {
            assert!(ht.remove(&i, &(2 * i))?);
        }
    }
    ht.verify_integrity()?;
    Ok(())
}

#[test]
fn test_split_grow_and_merge_back() -> Result<()> {
    let (pool, _file) = create_test_buffer_pool(50)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = ExtendibleHashTable::<i32, i32>::new(pool)?;

    // 5x the bucket capacity forces at least two splits.
    let total = 5 * BUCKET_CAPACITY;
    for key in 0..total {
        assert!(ht.insert(&key, &key)?, "failed to insert {}", key);
    }
    ht.verify_integrity()?;
    assert!(ht.global_depth()? >= 2);

    for key in 0..total {
        assert_eq!(ht.get_value(&key)?, vec![key], "failed to keep {}", key);
    }

    // remove everything again, newest first
    for key in (0..total).rev() {
        assert!(ht.remove(&key, &key)?, "failed to remove {}", key);
    }
    ht.verify_integrity()?;

    // the hash table should go back to its initial form
    assert_eq!(ht.global_depth()?, 0);
    Ok(())
}

#[test]
fn test_one_sided_split_recurses() -> Result<()> {
    let (pool, _file) = create_test_buffer_pool(50)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = ExtendibleHashTable::<i32, i32>::with_hash_fn(pool, identity_hash())?;

    // Every key is a multiple of 4, so the first two splits move nothing
    // and the insert only lands once the split reaches the third bit.
    for i in 0..=BUCKET_CAPACITY {
        let key = i * 4;
        assert!(ht.insert(&key, &key)?);
    }
    assert_eq!(ht.global_depth()?, 3);
    ht.verify_integrity()?;

    for i in 0..=BUCKET_CAPACITY {
        let key = i * 4;
        assert_eq!(ht.get_value(&key)?, vec![key]);
    }
    Ok(())
}

#[test]
fn test_directory_cannot_grow_past_max_depth() -> Result<()> {
    let (pool, _file) = create_test_buffer_pool(50)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = ExtendibleHashTable::<i32, i32>::with_hash_fn(pool, identity_hash())?;

    // Multiples of 2^10 collide on the low ten bits, so no split at any
    // reachable depth can separate them.
    for i in 0..BUCKET_CAPACITY {
        let key = i << 10;
        assert!(ht.insert(&key, &key)?);
    }
    let overflow = BUCKET_CAPACITY << 10;
    assert!(matches!(
        ht.insert(&overflow, &overflow),
        Err(IndexError::DirectoryFull)
    ));
    ht.verify_integrity()?;
    Ok(())
}

#[test]
fn test_empty_chain_merge_cascades() -> Result<()> {
    let (pool, _file) = create_test_buffer_pool(50)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = ExtendibleHashTable::<i32, i32>::with_hash_fn(pool, identity_hash())?;

    // Fill two buckets' worth so the directory splits on the low bit, then
    // push the even side deeper.
    for key in 0..(2 * BUCKET_CAPACITY) {
        assert!(ht.insert(&key, &key)?);
    }
    let depth_before = ht.global_depth()?;
    assert!(depth_before >= 1);

    // Removing everything must fold every split back together again, with
    // the final merges cascading through chains of empty split images.
    for key in 0..(2 * BUCKET_CAPACITY) {
        assert!(ht.remove(&key, &key)?);
    }
    assert_eq!(ht.global_depth()?, 0);
    ht.verify_integrity()?;
    Ok(())
}

#[test]
fn test_tiny_pool_retries_instead_of_failing() -> Result<()> {
    // Three frames: directory + bucket fit, but operations continually
    // recycle frames and must ride out transient pool exhaustion.
    let (pool, _file) = create_test_buffer_pool(3)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = ExtendibleHashTable::<i32, i32>::new(pool)?;

    for key in 0..600 {
        assert!(ht.insert(&key, &key)?);
    }
    for key in 0..600 {
        assert_eq!(ht.get_value(&key)?, vec![key]);
    }
    Ok(())
}

#[test]
fn test_multithreaded_random_mix_keeps_integrity() -> Result<()> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let (pool, _file) = create_test_buffer_pool(128)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = Arc::new(ExtendibleHashTable::<i32, i32>::new(pool)?);

    let mut handles = Vec::new();
    for seed in 0..4u64 {
        let ht = Arc::clone(&ht);
        handles.push(std::thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..5_000 {
                let key = rng.gen_range(0..2_000);
                if rng.gen_bool(0.5) {
                    ht.insert(&key, &key).unwrap();
                } else {
                    ht.remove(&key, &key).unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Whatever interleaving happened, the directory must stay consistent
    // and a key maps to at most the one value this workload ever wrote.
    ht.verify_integrity()?;
    for key in 0..2_000 {
        let values = ht.get_value(&key)?;
        assert!(values.len() <= 1);
        if let Some(&value) = values.first() {
            assert_eq!(value, key);
        }
    }
    Ok(())
}

#[test]
fn test_multithreaded_mixed_workload() -> Result<()> {
    let (pool, _file) = create_test_buffer_pool(128)?;
    let pool: Arc<dyn BufferPool> = pool;
    let ht = Arc::new(ExtendibleHashTable::<i32, i32>::new(pool)?);

    let mut handles = Vec::new();
    for t in 0..4 {
        let ht = Arc::clone(&ht);
        handles.push(std::thread::spawn(move || {
            // Each thread owns a disjoint key range, mixing inserts,
            // lookups and removals.
            let base = t * 1000;
            for i in 0..1000 {
                let key = base + i;
                ht.insert(&key, &key).unwrap();
                if i % 3 == 0 {
                    assert!(ht.remove(&key, &key).unwrap());
                } else {
                    assert_eq!(ht.get_value(&key).unwrap(), vec![key]);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    ht.verify_integrity()?;
    for t in 0..4 {
        let base = t * 1000;
        for i in 0..1000 {
            let key = base + i;
            let expected: Vec<i32> = if i % 3 == 0 { vec![] } else { vec![key] };
            assert_eq!(ht.get_value(&key)?, expected);
        }
    }
    Ok(())
}
