mod common;

use cfmapper::connection::ConsistencyLevel;
use cfmapper::core::StoredRow;
use cfmapper::prelude::*;
use cfmapper::storage::{FamilyKind, MemoryStore, MutationBatch, RowPage, WideColumnStore};
use common::{Order, order};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// Store whose counters are bumped by a phantom writer after every increment.
#[derive(Default)]
struct ContendedStore {
    inner: MemoryStore,
    interference: AtomicI64,
    // interfering increments left before the phantom writer stops
    remaining: AtomicU32,
}

impl ContendedStore {
    fn new(interference: i64, times: u32) -> Self {
        Self {
            interference: AtomicI64::new(interference),
            remaining: AtomicU32::new(times),
            ..Self::default()
        }
    }
}

impl WideColumnStore for ContendedStore {
    fn create_family(&self, family: &str, kind: FamilyKind) -> Result<()> {
        self.inner.create_family(family, kind)
    }

    fn create_index(&self, family: &str, column: &[u8]) -> Result<()> {
        self.inner.create_index(family, column)
    }

    fn get_row(&self, family: &str, key: &str, cl: ConsistencyLevel) -> Result<StoredRow> {
        self.inner.get_row(family, key, cl)
    }

    fn get_column(&self, family: &str, key: &str, column: &[u8], cl: ConsistencyLevel) -> Result<Option<Vec<u8>>> {
        self.inner.get_column(family, key, column, cl)
    }

    fn execute(&self, batch: MutationBatch, cl: ConsistencyLevel) -> Result<()> {
        self.inner.execute(batch, cl)
    }

    fn increment_counter(&self, family: &str, key: &str, column: &str, amount: i64, cl: ConsistencyLevel) -> Result<()> {
        self.inner.increment_counter(family, key, column, amount, cl)?;
        let armed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            let extra = self.interference.load(Ordering::SeqCst);
            self.inner.increment_counter(family, key, column, extra, cl)?;
        }
        Ok(())
    }

    fn get_counter(&self, family: &str, key: &str, column: &str, cl: ConsistencyLevel) -> Result<Option<i64>> {
        self.inner.get_counter(family, key, column, cl)
    }

    fn delete_counter(&self, family: &str, key: &str, column: &str) -> Result<()> {
        self.inner.delete_counter(family, key, column)
    }

    fn scan(&self, family: &str, after: Option<&str>, row_limit: usize, column_limit: usize) -> Result<RowPage> {
        self.inner.scan(family, after, row_limit, column_limit)
    }

    fn search_index(&self, family: &str, column: &[u8], value: &[u8]) -> Result<Vec<String>> {
        self.inner.search_index(family, column, value)
    }

    fn hosts(&self) -> Vec<String> {
        self.inner.hosts()
    }
}

fn store_over(raw: ContendedStore) -> Store {
    Store::over(Arc::new(raw), StoreConfig::new("contended")).unwrap()
}

#[test]
fn test_reconciliation_absorbs_transient_interference() {
    let store = store_over(ContendedStore::new(3, 2));
    store.set::<Order>("c-1", "quantity", 50i64).unwrap();
    assert_eq!(store.get::<Order>("c-1", "quantity").unwrap(), Some(Value::Integer(50)));
}

#[test]
fn test_persistent_interference_fails_to_converge() {
    let store = store_over(ContendedStore::new(1, u32::MAX));
    match store.set::<Order>("c-2", "quantity", 10i64) {
        Err(DbError::ConvergenceFailure { row, column, target, observed, attempts, .. }) => {
            assert_eq!(row, "c-2");
            assert_eq!(column, "QUANTITY");
            assert_eq!(target, 10);
            assert_eq!(observed, 11);
            assert_eq!(attempts, 4);
        }
        other => panic!("expected a convergence failure, got {:?}", other),
    }
}

#[test]
fn test_save_with_counters_surfaces_convergence_failure() {
    let store = store_over(ContendedStore::new(-1, u32::MAX));
    let err = store.save_with_counters(&order("c-3", "u1", 5)).unwrap_err();
    assert!(matches!(err, DbError::ConvergenceFailure { .. }));
    assert!(err.is_fatal());

    // the row itself was written before the counters
    assert!(store.find::<Order>("c-3").unwrap().is_some());
}

#[test]
fn test_offline_store_reports_connection_error() {
    let raw = Arc::new(MemoryStore::default());
    let store = Store::over(raw.clone(), StoreConfig::new("offline")).unwrap();
    store.save(&order("c-4", "u1", 1)).unwrap();

    raw.set_offline(true);
    assert!(matches!(store.find::<Order>("c-4"), Err(DbError::Connection(_))));
    raw.set_offline(false);
    assert!(store.find::<Order>("c-4").unwrap().is_some());
}
