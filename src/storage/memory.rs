use super::engine::{FamilyKind, Mutation, MutationBatch, RowPage, WideColumnStore};
use crate::codec;
use crate::connection::ConsistencyLevel;
use crate::core::{Cell, DbError, Result, StoredRow};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
struct StoredCell {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredCell {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
struct Family {
    kind: FamilyKind,
    rows: BTreeMap<String, BTreeMap<Vec<u8>, StoredCell>>,
    counters: BTreeMap<String, BTreeMap<String, i64>>,
    indexes: HashSet<Vec<u8>>,
}

impl Family {
    fn new(kind: FamilyKind) -> Self {
        Self {
            kind,
            rows: BTreeMap::new(),
            counters: BTreeMap::new(),
            indexes: HashSet::new(),
        }
    }

    fn live_cells(&self, key: &str, now: Instant, limit: usize) -> Vec<Cell> {
        match self.kind {
            FamilyKind::Standard => self
                .rows
                .get(key)
                .map(|columns| {
                    columns
                        .iter()
                        .filter(|(_, cell)| cell.is_live(now))
                        .take(limit)
                        .map(|(name, cell)| Cell::new(name.clone(), cell.value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            FamilyKind::Counter => self
                .counters
                .get(key)
                .map(|columns| {
                    columns
                        .iter()
                        .take(limit)
                        .map(|(name, ticks)| Cell::new(name.as_bytes(), codec::encode_counter(*ticks)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn keys_after<'a>(&'a self, after: Option<&'a str>) -> Box<dyn Iterator<Item = &'a String> + 'a> {
        use std::ops::Bound::{Excluded, Unbounded};
        let lower = after.map_or(Unbounded, |k| Excluded(k.to_string()));
        match self.kind {
            FamilyKind::Standard => Box::new(self.rows.range((lower, Unbounded)).map(|(k, _)| k)),
            FamilyKind::Counter => Box::new(self.counters.range((lower, Unbounded)).map(|(k, _)| k)),
        }
    }
}

/// Operation counters of a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    mutations: AtomicU64,
    batches: AtomicU64,
    increments: AtomicU64,
    counter_reads: AtomicU64,
    counter_deletes: AtomicU64,
    scans: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub reads: u64,
    pub mutations: u64,
    pub batches: u64,
    pub increments: u64,
    pub counter_reads: u64,
    pub counter_deletes: u64,
    pub scans: u64,
}

impl StoreStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            increments: self.increments.load(Ordering::Relaxed),
            counter_reads: self.counter_reads.load(Ordering::Relaxed),
            counter_deletes: self.counter_deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store Stats: {} reads, {} mutations in {} batches, {} increments, {} counter reads, {} scans",
            self.reads, self.mutations, self.batches, self.increments, self.counter_reads, self.scans
        )
    }
}

/// In-process wide-column store.
///
/// Deleted rows stay behind as tombstones until [`MemoryStore::compact`], TTL
/// columns vanish once expired, and index searches only work on declared
/// indexes. [`MemoryStore::set_offline`] makes every call fail with a
/// connection error.
pub struct MemoryStore {
    families: RwLock<HashMap<String, Family>>,
    hosts: Vec<String>,
    offline: AtomicBool,
    stats: StoreStats,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(vec!["127.0.0.1:9160".to_string()])
    }
}

impl MemoryStore {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            families: RwLock::new(HashMap::new()),
            hosts,
            offline: AtomicBool::new(false),
            stats: StoreStats::default(),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn family_exists(&self, family: &str) -> bool {
        self.families
            .read()
            .map(|families| families.contains_key(family))
            .unwrap_or(false)
    }

    /// Physically drops tombstones and expired columns.
    pub fn compact(&self) -> Result<usize> {
        let now = Instant::now();
        let mut families = self.families.write()?;
        let mut dropped = 0;
        for family in families.values_mut() {
            for columns in family.rows.values_mut() {
                columns.retain(|_, cell| cell.is_live(now));
            }
            let before = family.rows.len() + family.counters.len();
            family.rows.retain(|_, columns| !columns.is_empty());
            family.counters.retain(|_, columns| !columns.is_empty());
            dropped += before - family.rows.len() - family.counters.len();
        }
        Ok(dropped)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DbError::Connection(format!(
                "no host available among [{}]",
                self.hosts.join(", ")
            )));
        }
        Ok(())
    }

    fn unknown(family: &str) -> DbError {
        DbError::Configuration(format!("unknown column family '{}'", family))
    }

    fn expect_kind(family: &Family, name: &str, kind: FamilyKind) -> Result<()> {
        if family.kind != kind {
            return Err(DbError::TypeMismatch(format!(
                "'{}' is a {:?} family, not {:?}",
                name, family.kind, kind
            )));
        }
        Ok(())
    }

    /// Checks that `mutation` targets an existing family of the right kind.
    fn check(families: &HashMap<String, Family>, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Put { family, .. } => {
                let target = families.get(family).ok_or_else(|| Self::unknown(family))?;
                Self::expect_kind(target, family, FamilyKind::Standard)
            }
            Mutation::DeleteColumn { family, .. } | Mutation::DeleteRow { family, .. } => {
                families.get(family).map(|_| ()).ok_or_else(|| Self::unknown(family))
            }
        }
    }

    fn apply(families: &mut HashMap<String, Family>, mutation: Mutation, now: Instant) -> Result<()> {
        match mutation {
            Mutation::Put { family, key, column, value, ttl } => {
                let target = families.get_mut(&family).ok_or_else(|| Self::unknown(&family))?;
                Self::expect_kind(target, &family, FamilyKind::Standard)?;
                let cell = StoredCell {
                    value,
                    expires_at: ttl.map(|ttl| now + ttl),
                };
                target.rows.entry(key).or_default().insert(column, cell);
            }
            Mutation::DeleteColumn { family, key, column } => {
                let target = families.get_mut(&family).ok_or_else(|| Self::unknown(&family))?;
                if let Some(columns) = target.rows.get_mut(&key) {
                    columns.remove(&column);
                }
            }
            Mutation::DeleteRow { family, key } => {
                let target = families.get_mut(&family).ok_or_else(|| Self::unknown(&family))?;
                if let Some(columns) = target.rows.get_mut(&key) {
                    columns.clear();
                }
            }
        }
        Ok(())
    }
}

impl WideColumnStore for MemoryStore {
    fn create_family(&self, family: &str, kind: FamilyKind) -> Result<()> {
        self.check_online()?;
        let mut families = self.families.write()?;
        if let Some(existing) = families.get(family) {
            return Self::expect_kind(existing, family, kind);
        }
        trace!(family, ?kind, "creating column family");
        families.insert(family.to_string(), Family::new(kind));
        Ok(())
    }

    fn create_index(&self, family: &str, column: &[u8]) -> Result<()> {
        self.check_online()?;
        let mut families = self.families.write()?;
        let target = families.get_mut(family).ok_or_else(|| Self::unknown(family))?;
        Self::expect_kind(target, family, FamilyKind::Standard)?;
        target.indexes.insert(column.to_vec());
        Ok(())
    }

    fn get_row(&self, family: &str, key: &str, consistency: ConsistencyLevel) -> Result<StoredRow> {
        self.check_online()?;
        StoreStats::bump(&self.stats.reads, 1);
        trace!(family, key, %consistency, "get_row");
        let families = self.families.read()?;
        let target = families.get(family).ok_or_else(|| Self::unknown(family))?;
        Ok(StoredRow {
            key: key.to_string(),
            cells: target.live_cells(key, Instant::now(), usize::MAX),
        })
    }

    fn get_column(
        &self,
        family: &str,
        key: &str,
        column: &[u8],
        consistency: ConsistencyLevel,
    ) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        StoreStats::bump(&self.stats.reads, 1);
        trace!(family, key, %consistency, "get_column");
        let families = self.families.read()?;
        let target = families.get(family).ok_or_else(|| Self::unknown(family))?;
        let now = Instant::now();
        Ok(target
            .rows
            .get(key)
            .and_then(|columns| columns.get(column))
            .filter(|cell| cell.is_live(now))
            .map(|cell| cell.value.clone()))
    }

    fn execute(&self, batch: MutationBatch, consistency: ConsistencyLevel) -> Result<()> {
        self.check_online()?;
        if batch.is_empty() {
            return Ok(());
        }
        let mutations = batch.into_mutations();
        let mut families = self.families.write()?;
        // a rejected batch leaves nothing behind
        for mutation in &mutations {
            Self::check(&families, mutation)?;
        }

        StoreStats::bump(&self.stats.batches, 1);
        StoreStats::bump(&self.stats.mutations, mutations.len() as u64);
        trace!(mutations = mutations.len(), %consistency, "executing batch");

        let now = Instant::now();
        for mutation in mutations {
            Self::apply(&mut families, mutation, now)?;
        }
        Ok(())
    }

    fn increment_counter(
        &self,
        family: &str,
        key: &str,
        column: &str,
        amount: i64,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        self.check_online()?;
        StoreStats::bump(&self.stats.increments, 1);
        trace!(family, key, column, amount, %consistency, "increment");
        let mut families = self.families.write()?;
        let target = families.get_mut(family).ok_or_else(|| Self::unknown(family))?;
        Self::expect_kind(target, family, FamilyKind::Counter)?;
        let ticks = target
            .counters
            .entry(key.to_string())
            .or_default()
            .entry(column.to_string())
            .or_insert(0);
        *ticks = ticks.wrapping_add(amount);
        Ok(())
    }

    fn get_counter(
        &self,
        family: &str,
        key: &str,
        column: &str,
        consistency: ConsistencyLevel,
    ) -> Result<Option<i64>> {
        self.check_online()?;
        StoreStats::bump(&self.stats.counter_reads, 1);
        trace!(family, key, column, %consistency, "get_counter");
        let families = self.families.read()?;
        let target = families.get(family).ok_or_else(|| Self::unknown(family))?;
        Self::expect_kind(target, family, FamilyKind::Counter)?;
        Ok(target.counters.get(key).and_then(|columns| columns.get(column)).copied())
    }

    fn delete_counter(&self, family: &str, key: &str, column: &str) -> Result<()> {
        self.check_online()?;
        StoreStats::bump(&self.stats.counter_deletes, 1);
        let mut families = self.families.write()?;
        let target = families.get_mut(family).ok_or_else(|| Self::unknown(family))?;
        Self::expect_kind(target, family, FamilyKind::Counter)?;
        if let Some(columns) = target.counters.get_mut(key) {
            columns.remove(column);
        }
        Ok(())
    }

    fn scan(
        &self,
        family: &str,
        after: Option<&str>,
        row_limit: usize,
        column_limit: usize,
    ) -> Result<RowPage> {
        self.check_online()?;
        StoreStats::bump(&self.stats.scans, 1);
        let families = self.families.read()?;
        let target = families.get(family).ok_or_else(|| Self::unknown(family))?;
        let now = Instant::now();
        let rows = target
            .keys_after(after)
            .take(row_limit)
            .map(|key| StoredRow {
                key: key.clone(),
                cells: target.live_cells(key, now, column_limit),
            })
            .collect();
        Ok(RowPage { rows })
    }

    fn search_index(&self, family: &str, column: &[u8], value: &[u8]) -> Result<Vec<String>> {
        self.check_online()?;
        StoreStats::bump(&self.stats.reads, 1);
        let families = self.families.read()?;
        let target = families.get(family).ok_or_else(|| Self::unknown(family))?;
        if !target.indexes.contains(column) {
            return Err(DbError::IndexUnavailable {
                family: family.to_string(),
                column: String::from_utf8_lossy(column).into_owned(),
            });
        }
        let now = Instant::now();
        Ok(target
            .rows
            .iter()
            .filter(|(_, columns)| {
                columns
                    .get(column)
                    .is_some_and(|cell| cell.is_live(now) && cell.value == value)
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn hosts(&self) -> Vec<String> {
        self.hosts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CL: ConsistencyLevel = ConsistencyLevel::Quorum;

    fn store() -> MemoryStore {
        let store = MemoryStore::default();
        store.create_family("Order", FamilyKind::Standard).unwrap();
        store.create_family("Order_Counters", FamilyKind::Counter).unwrap();
        store
    }

    fn put(store: &MemoryStore, key: &str, column: &str, value: &str) {
        let mut batch = MutationBatch::new();
        batch.put("Order", key, column.as_bytes().to_vec(), value.as_bytes().to_vec());
        store.execute(batch, CL).unwrap();
    }

    #[test]
    fn test_deleted_row_leaves_tombstone() {
        let store = store();
        put(&store, "a", "NAME", "x");
        put(&store, "b", "NAME", "y");

        let mut batch = MutationBatch::new();
        batch.delete_row("Order", "a");
        store.execute(batch, CL).unwrap();

        assert!(store.get_row("Order", "a", CL).unwrap().is_tombstone());
        let page = store.scan("Order", None, 10, 10).unwrap();
        assert_eq!(page.rows.len(), 2);
        assert!(page.rows[0].is_tombstone());

        assert_eq!(store.compact().unwrap(), 1);
        assert_eq!(store.scan("Order", None, 10, 10).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_scan_continues_after_key() {
        let store = store();
        for key in ["a", "b", "c", "d"] {
            put(&store, key, "NAME", key);
        }
        let first = store.scan("Order", None, 2, 1).unwrap();
        assert_eq!(first.last_key(), Some("b"));
        let second = store.scan("Order", first.last_key(), 2, 1).unwrap();
        let keys: Vec<_> = second.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "d"]);
    }

    #[test]
    fn test_counters_only_increment() {
        let store = store();
        store.increment_counter("Order_Counters", "a", "QUANTITY", 5, CL).unwrap();
        store.increment_counter("Order_Counters", "a", "QUANTITY", -2, CL).unwrap();
        assert_eq!(store.get_counter("Order_Counters", "a", "QUANTITY", CL).unwrap(), Some(3));
        assert_eq!(store.get_counter("Order_Counters", "a", "REFUND", CL).unwrap(), None);

        let mut batch = MutationBatch::new();
        batch.put("Order_Counters", "a", b"QUANTITY".to_vec(), vec![1]);
        assert!(matches!(store.execute(batch, CL), Err(DbError::TypeMismatch(_))));
    }

    #[test]
    fn test_rejected_batch_applies_nothing() {
        let store = store();
        put(&store, "a", "NAME", "x");

        let mut batch = MutationBatch::new();
        batch.delete_row("Order", "a");
        batch.put("Order", "b", b"NAME".to_vec(), b"y".to_vec());
        batch.put("Order_Counters", "b", b"QUANTITY".to_vec(), vec![1]);
        assert!(matches!(store.execute(batch, CL), Err(DbError::TypeMismatch(_))));

        let mut batch = MutationBatch::new();
        batch.put("Order", "c", b"NAME".to_vec(), b"z".to_vec());
        batch.delete_row("Missing", "c");
        assert!(matches!(store.execute(batch, CL), Err(DbError::Configuration(_))));

        assert!(!store.get_row("Order", "a", CL).unwrap().is_tombstone());
        assert!(store.get_row("Order", "b", CL).unwrap().is_tombstone());
        assert!(store.get_row("Order", "c", CL).unwrap().is_tombstone());
        assert_eq!(store.stats().batches, 1);
    }

    #[test]
    fn test_ttl_columns_expire() {
        let store = store();
        let mut batch = MutationBatch::new();
        batch.put_with_ttl("Order", "a", b"TEMP".to_vec(), b"v".to_vec(), Some(Duration::ZERO));
        batch.put("Order", "a", b"KEEP".to_vec(), b"v".to_vec());
        store.execute(batch, CL).unwrap();

        let row = store.get_row("Order", "a", CL).unwrap();
        assert_eq!(row.cells.len(), 1);
        assert_eq!(row.cells[0].name, b"KEEP".to_vec());
    }

    #[test]
    fn test_index_must_be_declared() {
        let store = store();
        put(&store, "a", "USER", "u1");
        assert!(matches!(
            store.search_index("Order", b"USER", b"u1"),
            Err(DbError::IndexUnavailable { .. })
        ));
        store.create_index("Order", b"USER").unwrap();
        assert_eq!(store.search_index("Order", b"USER", b"u1").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_offline_store_fails_with_connection_error() {
        let store = store();
        store.set_offline(true);
        assert!(matches!(store.get_row("Order", "a", CL), Err(DbError::Connection(_))));
        store.set_offline(false);
        assert!(store.get_row("Order", "a", CL).is_ok());
    }

    #[test]
    fn test_stats_count_operations() {
        let store = store();
        put(&store, "a", "NAME", "x");
        store.increment_counter("Order_Counters", "a", "QUANTITY", 1, CL).unwrap();
        let stats = store.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.mutations, 1);
        assert_eq!(stats.increments, 1);
    }
}
