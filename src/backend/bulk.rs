//! Paged iteration and batched deletion over whole column families.

use crate::connection::ConsistencyLevel;
use crate::core::{Result, StoredRow};
use crate::storage::{MutationBatch, WideColumnStore};
use std::collections::VecDeque;
use tracing::debug;

/// One page of items plus the continuation token for the next request.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Last key the source looked at, tombstones included.
    pub last_key: Option<String>,
    /// No rows remain after this page.
    pub exhausted: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            last_key: None,
            exhausted: true,
        }
    }
}

/// Iterator that fetches pages on demand and resumes from the last seen key.
///
/// A page may hold no items but still advance the continuation when every
/// row in it was a tombstone.
pub struct Pager<T, F> {
    fetch: F,
    buffered: VecDeque<T>,
    after: Option<String>,
    done: bool,
}

impl<T, F> Pager<T, F>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            buffered: VecDeque::new(),
            after: None,
            done: false,
        }
    }
}

impl<T, F> Iterator for Pager<T, F>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }

            match (self.fetch)(self.after.as_deref()) {
                Ok(page) => {
                    let stalled = page.last_key.is_none() || page.last_key == self.after;
                    self.done = page.exhausted || stalled;
                    self.after = page.last_key;
                    self.buffered.extend(page.items);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Reads one page of raw rows and drops the tombstones.
pub fn live_page(
    store: &dyn WideColumnStore,
    family: &str,
    after: Option<&str>,
    row_limit: usize,
    column_limit: usize,
) -> Result<Page<StoredRow>> {
    let raw = store.scan(family, after, row_limit, column_limit)?;
    let exhausted = raw.rows.len() < row_limit;
    let last_key = raw.last_key().map(str::to_string);
    Ok(Page {
        items: raw.rows.into_iter().filter(|row| !row.is_tombstone()).collect(),
        last_key,
        exhausted,
    })
}

/// Deletes every live row of `family`, flushing a batch each `batch_size` rows.
/// Returns the number of rows deleted.
pub fn delete_rows(
    store: &dyn WideColumnStore,
    family: &str,
    page_size: usize,
    batch_size: usize,
    consistency: ConsistencyLevel,
) -> Result<usize> {
    let mut batch = MutationBatch::new();
    let mut deleted = 0;

    // Two columns are enough to tell a live row from a tombstone.
    let pages = Pager::new(|after| {
        live_page(store, family, after, page_size, 2).map(|page| Page {
            items: vec![page.items],
            last_key: page.last_key,
            exhausted: page.exhausted,
        })
    });

    for rows in pages {
        for row in rows? {
            batch.delete_row(family, &row.key);
            deleted += 1;
            if batch.len() >= batch_size {
                debug!(family, rows = batch.len(), "flushing delete batch");
                store.execute(batch.take(), consistency)?;
            }
        }
    }

    if !batch.is_empty() {
        debug!(family, rows = batch.len(), "flushing delete batch");
        store.execute(batch, consistency)?;
    }
    Ok(deleted)
}

/// Deletes every counter column of `family`, one column at a time.
///
/// Each row is read at most `column_limit` columns per pass; passes repeat
/// until one finds nothing left to delete.
pub fn clear_counters(
    store: &dyn WideColumnStore,
    family: &str,
    page_size: usize,
    column_limit: usize,
) -> Result<usize> {
    let mut cleared = 0;
    loop {
        let mut pass = 0;
        let pages = Pager::new(|after| live_page(store, family, after, page_size, column_limit));
        for row in pages {
            let row = row?;
            for cell in &row.cells {
                let column = String::from_utf8_lossy(&cell.name);
                store.delete_counter(family, &row.key, &column)?;
                pass += 1;
            }
        }
        debug!(family, columns = pass, "counter clearing pass");
        if pass == 0 {
            return Ok(cleared);
        }
        cleared += pass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FamilyKind, MemoryStore};

    const CL: ConsistencyLevel = ConsistencyLevel::One;

    fn seeded(rows: usize) -> MemoryStore {
        let store = MemoryStore::default();
        store.create_family("Item", FamilyKind::Standard).unwrap();
        let mut batch = MutationBatch::new();
        for i in 0..rows {
            batch.put("Item", &format!("row-{:04}", i), b"NAME".to_vec(), b"x".to_vec());
        }
        store.execute(batch, CL).unwrap();
        store
    }

    #[test]
    fn test_pager_skips_tombstone_pages() {
        let store = seeded(25);
        let mut batch = MutationBatch::new();
        for i in 0..10 {
            batch.delete_row("Item", &format!("row-{:04}", i));
        }
        store.execute(batch, CL).unwrap();

        let rows: Vec<_> = Pager::new(|after| live_page(&store, "Item", after, 5, 10))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 15);
        assert_eq!(rows[0].key, "row-0010");
    }

    #[test]
    fn test_pager_is_restartable() {
        let store = seeded(7);
        let count = || Pager::new(|after| live_page(&store, "Item", after, 3, 1)).count();
        assert_eq!(count(), 7);
        assert_eq!(count(), 7);
    }

    #[test]
    fn test_delete_rows_flushes_in_batches() {
        let store = seeded(205);
        let before = store.stats().batches;

        assert_eq!(delete_rows(&store, "Item", 100, 80, CL).unwrap(), 205);
        // 80 + 80 + 45
        assert_eq!(store.stats().batches - before, 3);
        assert_eq!(Pager::new(|after| live_page(&store, "Item", after, 100, 1)).count(), 0);
        assert_eq!(delete_rows(&store, "Item", 100, 80, CL).unwrap(), 0);
    }

    #[test]
    fn test_clear_counters_handles_wide_rows() {
        let store = MemoryStore::default();
        store.create_family("Item_Counters", FamilyKind::Counter).unwrap();
        for c in 0..30 {
            store
                .increment_counter("Item_Counters", "a", &format!("C{:02}", c), 1, CL)
                .unwrap();
        }
        store.increment_counter("Item_Counters", "b", "C00", 4, CL).unwrap();

        assert_eq!(clear_counters(&store, "Item_Counters", 100, 25).unwrap(), 31);
        assert_eq!(store.get_counter("Item_Counters", "a", "C29", CL).unwrap(), None);
    }
}
