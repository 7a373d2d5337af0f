use anyhow::Result;

use taigadb::storage::buffer::{BufferPool, BufferPoolError};

mod common;
use common::create_test_parallel_pool;

#[test]
fn test_ids_stride_across_instances() -> Result<()> {
    let (pool, _file) = create_test_parallel_pool(4, 5)?;

    let mut page_ids = Vec::new();
    for _ in 0..12 {
        let (page_id, _page) = pool.new_page()?;
        page_ids.push(page_id);
        pool.unpin_page(page_id, false)?;
    }

    // The rotation spreads allocations over every shard.
    let residues: std::collections::HashSet<i32> = page_ids.iter().map(|id| id % 4).collect();
    assert_eq!(residues.len(), 4);

    // Each id routes back to the shard that allocated it.
    for page_id in page_ids {
        let page = pool.fetch_page(page_id)?;
        assert_eq!(page.page_id(), page_id);
        pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_new_page_scans_all_shards() -> Result<()> {
    let (pool, _file) = create_test_parallel_pool(2, 2)?;

    // Four frames in total; pin them all.
    let mut page_ids = Vec::new();
    for _ in 0..4 {
        let (page_id, _page) = pool.new_page()?;
        page_ids.push(page_id);
    }
    assert!(matches!(pool.new_page(), Err(BufferPoolError::PoolExhausted)));

    // Freeing a single frame on any shard is enough again.
    pool.unpin_page(page_ids[0], false)?;
    let (page_id, _page) = pool.new_page()?;
    pool.unpin_page(page_id, false)?;
    for &page_id in &page_ids[1..] {
        pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_shards_share_one_database_file() -> Result<()> {
    let (pool, _file) = create_test_parallel_pool(4, 3)?;

    let mut written = Vec::new();
    for i in 0..8u64 {
        let (page_id, page) = pool.new_page()?;
        {
            let mut data = page.data().write();
            data[16..24].copy_from_slice(&(i * 7).to_le_bytes());
            page.mark_dirty();
        }
        pool.unpin_page(page_id, true)?;
        written.push((page_id, i * 7));
    }
    pool.flush_all_pages()?;

    for (page_id, expected) in written {
        let page = pool.fetch_page(page_id)?;
        assert_eq!(page.data().read()[16..24], expected.to_le_bytes());
        pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_concurrent_allocation_is_disjoint() -> Result<()> {
    let (pool, _file) = create_test_parallel_pool(4, 16)?;
    let mut handles = Vec::new();

    for _ in 0..4 {
        let pool = std::sync::Arc::clone(&pool);
        handles.push(std::thread::spawn(move || {
            let mut ids = Vec::new();
            for _ in 0..30 {
                let (page_id, _page) = pool.new_page().unwrap();
                pool.unpin_page(page_id, false).unwrap();
                ids.push(page_id);
            }
            ids
        }));
    }

    let mut all_ids = Vec::new();
    for handle in handles {
        all_ids.extend(handle.join().unwrap());
    }
    let unique: std::collections::HashSet<i32> = all_ids.iter().copied().collect();
    assert_eq!(unique.len(), all_ids.len(), "page ids must never repeat");
    Ok(())
}
