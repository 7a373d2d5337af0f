use anyhow::Result;

use taigadb::storage::buffer::{BufferPool, BufferPoolError, BufferPoolManager};

mod common;
use common::{create_temp_db_file, create_test_buffer_pool};

#[test]
fn test_new_page_until_pool_is_full() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(10)?;

    // The first ten pages come straight off the free list with ids 0..9.
    let mut page_ids = Vec::new();
    for expected in 0..10 {
        let (page_id, _page) = buffer_pool.new_page()?;
        assert_eq!(page_id, expected);
        page_ids.push(page_id);
    }

    // Everything is pinned, so the eleventh page cannot be created.
    assert!(matches!(buffer_pool.new_page(), Err(BufferPoolError::PoolExhausted)));

    // Unpin the first five (dirty) and five more creations succeed.
    for &page_id in page_ids.iter().take(5) {
        let page = buffer_pool.fetch_page(page_id)?;
        {
            let mut data = page.data().write();
            data[0..8].copy_from_slice(&(page_id as u64).to_le_bytes());
            page.mark_dirty();
        }
        buffer_pool.unpin_page(page_id, true)?;
        buffer_pool.unpin_page(page_id, true)?;
    }
    for _ in 0..5 {
        assert!(buffer_pool.new_page().is_ok());
    }

    // Page 0 was evicted and flushed; fetching it reads the bytes back.
    assert!(matches!(buffer_pool.new_page(), Err(BufferPoolError::PoolExhausted)));
    for page_id in 5..10 {
        buffer_pool.unpin_page(page_id, false)?;
    }
    let page = buffer_pool.fetch_page(0)?;
    assert_eq!(page.data().read()[0..8], 0u64.to_le_bytes());
    buffer_pool.unpin_page(0, false)?;

    Ok(())
}

#[test]
fn test_page_modification_survives_eviction() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(3)?;

    let (victim_id, victim) = buffer_pool.new_page()?;
    {
        let mut data = victim.data().write();
        let payload = b"Test Data";
        data[100..100 + payload.len()].copy_from_slice(payload);
        victim.mark_dirty();
    }
    buffer_pool.unpin_page(victim_id, true)?;

    // Churn through enough pages to evict the victim.
    for _ in 0..4 {
        let (page_id, _page) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(page_id, false)?;
    }

    let fetched = buffer_pool.fetch_page(victim_id)?;
    assert_eq!(&fetched.data().read()[100..109], b"Test Data");
    buffer_pool.unpin_page(victim_id, false)?;
    Ok(())
}

#[test]
fn test_pool_of_one_refuses_until_unpin() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1)?;

    let (page_id, _page) = buffer_pool.new_page()?;
    assert!(matches!(buffer_pool.new_page(), Err(BufferPoolError::PoolExhausted)));
    assert!(matches!(
        buffer_pool.fetch_page(page_id + 1),
        Err(BufferPoolError::PoolExhausted)
    ));

    buffer_pool.unpin_page(page_id, false)?;
    let (second_id, _page) = buffer_pool.new_page()?;
    assert_ne!(second_id, page_id);
    buffer_pool.unpin_page(second_id, false)?;
    Ok(())
}

#[test]
fn test_flush_all_and_reopen() -> Result<()> {
    let (_file, path) = create_temp_db_file()?;
    let mut page_ids = Vec::new();

    {
        let buffer_pool = BufferPoolManager::new(10, &path)?;
        for i in 0..5u64 {
            let (page_id, page) = buffer_pool.new_page()?;
            {
                let mut data = page.data().write();
                data[0..8].copy_from_slice(&(i * 1000).to_le_bytes());
                page.mark_dirty();
            }
            buffer_pool.unpin_page(page_id, true)?;
            page_ids.push(page_id);
        }
        buffer_pool.flush_all_pages()?;
    }

    // A new pool over the same file sees the flushed images.
    let buffer_pool = BufferPoolManager::new(10, &path)?;
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(page.data().read()[0..8], ((i as u64) * 1000).to_le_bytes());
        buffer_pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_flush_respects_concurrent_redirty() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(4)?;

    let (page_id, page) = buffer_pool.new_page()?;
    buffer_pool.flush_page(page_id)?;
    assert!(!page.is_dirty());

    // A writer that dirties the page after the flush keeps it dirty.
    {
        let mut data = page.data().write();
        data[0] = 0xab;
        page.mark_dirty();
    }
    assert!(page.is_dirty());
    buffer_pool.unpin_page(page_id, true)?;
    Ok(())
}

#[test]
fn test_delete_page_returns_frame() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(1)?;

    let (page_id, _page) = buffer_pool.new_page()?;
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;

    // The frame is back on the free list, so a new page fits even though
    // the pool only has one frame.
    let (next_id, _page) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(next_id, false)?;

    // Deleting a page nobody has is not an error.
    buffer_pool.delete_page(9999)?;
    Ok(())
}

#[test]
fn test_concurrent_new_fetch_unpin() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(32)?;
    let mut handles = Vec::new();

    for _ in 0..4 {
        let pool = std::sync::Arc::clone(&buffer_pool);
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                let (page_id, page) = pool.new_page().unwrap();
                {
                    let mut data = page.data().write();
                    data[0..4].copy_from_slice(&page_id.to_le_bytes());
                    page.mark_dirty();
                }
                pool.unpin_page(page_id, true).unwrap();

                let fetched = pool.fetch_page(page_id).unwrap();
                assert_eq!(fetched.data().read()[0..4], page_id.to_le_bytes());
                pool.unpin_page(page_id, false).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    Ok(())
}
