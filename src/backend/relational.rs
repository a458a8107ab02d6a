use super::bulk::Page;
use super::counter::{self, CounterCells};
use super::port::{self, StoragePort};
use crate::connection::StoreConfig;
use crate::core::{DbError, Record, Result, Value};
use crate::dictionary::Dictionary;
use crate::model::{EntityMetadata, FieldKind};
use crate::storage::{Table, TableRow, TableSchema};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

type CounterCellsMap = BTreeMap<(String, String), i64>;
type CompositeCells = BTreeMap<(String, String, String), (String, Option<Instant>)>;

/// Storage port over in-memory relational tables.
///
/// Same contract as the column-family backend with one table per record
/// type. Deletes are physical, so no tombstones are ever observed.
#[derive(Default)]
pub struct RelationalBackend {
    config: StoreConfig,
    tables: RwLock<HashMap<String, Table>>,
    counters: RwLock<HashMap<String, CounterCellsMap>>,
    composites: RwLock<HashMap<String, CompositeCells>>,
}

impl RelationalBackend {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn with_table<R>(&self, meta: &EntityMetadata, f: impl FnOnce(&Table) -> Result<R>) -> Result<R> {
        self.ensure_schema(meta)?;
        let tables = self.tables.read()?;
        let table = tables.get(meta.family()).ok_or_else(|| missing_table(meta))?;
        f(table)
    }

    fn with_table_mut<R>(&self, meta: &EntityMetadata, f: impl FnOnce(&mut Table) -> Result<R>) -> Result<R> {
        self.ensure_schema(meta)?;
        let mut tables = self.tables.write()?;
        let table = tables.get_mut(meta.family()).ok_or_else(|| missing_table(meta))?;
        f(table)
    }

    fn hydrate(&self, meta: &EntityMetadata, key: &str, row: &TableRow) -> Result<Record> {
        let mut record = Record::new(key);
        for field in meta.fields() {
            if field.is_counter() {
                record.set(field.name(), counter::read(self, meta, key, field)?);
            } else if let FieldKind::DictionaryList { family } = field.kind() {
                record.set(field.name(), Value::Dictionaries(self.find_composites(family, key)?));
            } else if let Some(value) = row.get(field.name()) {
                record.set(field.name(), value.clone());
            }
        }
        Ok(record)
    }

    fn clear_row_counters(&self, meta: &EntityMetadata, id: &str) -> Result<()> {
        let mut counters = self.counters.write()?;
        if let Some(cells) = counters.get_mut(meta.counter_family()) {
            cells.retain(|(row, _), _| row != id);
        }
        Ok(())
    }

    /// Live composite entries of `row`, expired ones dropped on the way.
    fn composite_entries(&self, family: &str, row: &str) -> Result<Vec<(String, String, String)>> {
        let mut composites = self.composites.write()?;
        let Some(cells) = composites.get_mut(family) else {
            return Ok(Vec::new());
        };
        let now = Instant::now();
        cells.retain(|_, (_, expires)| expires.is_none_or(|at| at > now));
        Ok(cells
            .iter()
            .filter(|((r, _, _), _)| r == row)
            .map(|((_, dict, key), (value, _))| (dict.clone(), key.clone(), value.clone()))
            .collect())
    }
}

fn missing_table(meta: &EntityMetadata) -> DbError {
    DbError::Configuration(format!("table '{}' was not created", meta.family()))
}

fn table_schema(meta: &EntityMetadata) -> TableSchema {
    let columns = meta
        .fields()
        .iter()
        .filter(|f| !f.is_counter() && !f.kind().is_dictionary())
        .map(|f| f.name().to_string())
        .collect();
    TableSchema::new(meta.family(), columns)
}

impl CounterCells for RelationalBackend {
    fn read_ticks(&self, meta: &EntityMetadata, row: &str, column: &str) -> Result<Option<i64>> {
        let counters = self.counters.read()?;
        Ok(counters
            .get(meta.counter_family())
            .and_then(|cells| cells.get(&(row.to_string(), column.to_string())))
            .copied())
    }

    fn add_ticks(&self, meta: &EntityMetadata, row: &str, column: &str, amount: i64) -> Result<()> {
        let mut counters = self.counters.write()?;
        let ticks = counters
            .entry(meta.counter_family().to_string())
            .or_default()
            .entry((row.to_string(), column.to_string()))
            .or_insert(0);
        *ticks = ticks.wrapping_add(amount);
        Ok(())
    }
}

impl StoragePort for RelationalBackend {
    fn backend_name(&self) -> &'static str {
        "relational"
    }

    fn hosts(&self) -> Vec<String> {
        vec!["local".to_string()]
    }

    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn ensure_schema(&self, meta: &EntityMetadata) -> Result<()> {
        if self.tables.read()?.contains_key(meta.family()) {
            return Ok(());
        }

        let mut tables = self.tables.write()?;
        if tables.contains_key(meta.family()) {
            return Ok(());
        }
        let mut table = Table::new(table_schema(meta));
        for field in meta.index_fields() {
            table.create_index(field.name())?;
        }
        debug!(table = meta.family(), "created table");
        tables.insert(meta.family().to_string(), table);
        Ok(())
    }

    fn find(&self, meta: &EntityMetadata, id: &str) -> Result<Option<Record>> {
        let row = self.with_table(meta, |table| Ok(table.get(id).cloned()))?;
        row.map(|row| self.hydrate(meta, id, &row)).transpose()
    }

    fn find_by_key(&self, meta: &EntityMetadata, field: &str, value: &Value) -> Result<Vec<Record>> {
        let column = meta.require_field(field)?;
        if !column.is_indexed() {
            return Err(DbError::IndexUnavailable {
                family: meta.family().to_string(),
                column: column.name().to_string(),
            });
        }

        let value = column.coerce(value.clone())?;
        let keys = self.with_table(meta, |table| table.lookup(column.name(), &value))?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.find(meta, &key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn scan_page(&self, meta: &EntityMetadata, after: Option<&str>, limit: usize) -> Result<Page<Record>> {
        let rows = self.with_table(meta, |table| Ok(table.scan_after(after, limit)))?;
        let exhausted = rows.len() < limit;
        let last_key = rows.last().map(|(key, _)| key.clone());
        let items = rows
            .iter()
            .map(|(key, row)| self.hydrate(meta, key, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            last_key,
            exhausted,
        })
    }

    fn save(&self, meta: &EntityMetadata, record: &Record, write_counters: bool) -> Result<()> {
        let id = record.validate_key()?;
        let row: TableRow = meta
            .fields()
            .iter()
            .filter(|f| !f.is_counter() && !f.kind().is_dictionary())
            .map(|f| (f.name().to_string(), record.value_or_null(f.name())))
            .collect();
        trace!(table = meta.family(), id, "upserting row");
        self.with_table_mut(meta, |table| table.upsert(id, row))?;
        port::write_changed_dictionaries(self, meta, record)?;

        if write_counters {
            for field in meta.counter_fields() {
                let target = field.to_ticks(&record.value_or_null(field.name()))?;
                counter::reconcile(self, meta, id, field, target)?;
            }
        }
        Ok(())
    }

    fn count(&self, meta: &EntityMetadata) -> Result<u64> {
        self.with_table(meta, |table| Ok(table.row_count() as u64))
    }

    fn increment(&self, meta: &EntityMetadata, id: &str, field: &str, amount: i64) -> Result<bool> {
        let Some(column) = meta.field_for(field).filter(|f| f.is_counter()) else {
            debug!(table = meta.family(), field, "increment on a non-counter field");
            return Ok(false);
        };
        counter::adjust(self, meta, id, column, amount)?;
        Ok(true)
    }

    fn get_column_value(&self, meta: &EntityMetadata, id: &str, field: &str) -> Result<Option<Value>> {
        let column = meta.require_field(field)?;

        if column.is_counter() {
            let value = counter::read(self, meta, id, column)?;
            return Ok((!value.is_null()).then_some(value));
        }

        if let FieldKind::DictionaryList { family } = column.kind() {
            return Ok(Some(Value::Dictionaries(self.find_composites(family, id)?)));
        }

        let stored = self.with_table(meta, |table| {
            Ok(table.get(id).and_then(|row| row.get(column.name())).cloned())
        })?;
        Ok(stored
            .map(|value| column.parse_value(value))
            .filter(|value| !value.is_null()))
    }

    fn set_column_value(&self, meta: &EntityMetadata, id: &str, field: &str, value: Value) -> Result<()> {
        let column = meta.require_field(field)?;

        if column.is_counter() {
            let target = column.to_ticks(&value)?;
            counter::reconcile(self, meta, id, column, target)?;
            return Ok(());
        }

        if column.kind().is_dictionary() {
            let record = Record::new(id).with(column.name(), value);
            port::write_changed_dictionaries(self, meta, &record)?;
            return Ok(());
        }

        let value = column.coerce(value)?;
        self.with_table_mut(meta, |table| table.update_column(id, column.name(), value))
    }

    fn delete(&self, meta: &EntityMetadata, id: &str) -> Result<()> {
        let removed = self.with_table_mut(meta, |table| Ok(table.delete(id)))?;
        trace!(table = meta.family(), id, removed, "deleted row");
        self.clear_row_counters(meta, id)
    }

    fn delete_all(&self, meta: &EntityMetadata) -> Result<()> {
        let rows = self.with_table_mut(meta, |table| Ok(table.truncate()))?;
        let counters = self
            .counters
            .write()?
            .remove(meta.counter_family())
            .map_or(0, |cells| cells.len());
        debug!(table = meta.family(), rows, counters, "deleted all rows");
        Ok(())
    }

    fn write_composite(
        &self,
        family: &str,
        row: &str,
        dictionary: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.composites.write()?.entry(family.to_string()).or_default().insert(
            (row.to_string(), dictionary.to_string(), key.to_string()),
            (value.to_string(), expires),
        );
        Ok(())
    }

    fn find_composite(&self, family: &str, row: &str, dictionary: &str) -> Result<BTreeMap<String, String>> {
        Ok(self
            .composite_entries(family, row)?
            .into_iter()
            .filter(|(dict, _, _)| dict == dictionary)
            .map(|(_, key, value)| (key, value))
            .collect())
    }

    fn find_composites(&self, family: &str, row: &str) -> Result<Vec<Dictionary>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (dict, key, value) in self.composite_entries(family, row)? {
            grouped.entry(dict).or_default().insert(key, value);
        }
        Ok(grouped
            .into_iter()
            .map(|(dict, entries)| Dictionary::loaded(row, dict, entries))
            .collect())
    }

    fn delete_composite(&self, family: &str, row: &str, dictionary: &str, key: Option<&str>) -> Result<usize> {
        let mut composites = self.composites.write()?;
        let Some(cells) = composites.get_mut(family) else {
            return Ok(0);
        };
        let now = Instant::now();
        cells.retain(|_, (_, expires)| expires.is_none_or(|at| at > now));
        let before = cells.len();
        cells.retain(|(r, dict, inner), _| {
            !(r == row && dict == dictionary && key.is_none_or(|k| k == inner))
        });
        Ok(before - cells.len())
    }

    fn delete_composite_family(&self, family: &str) -> Result<usize> {
        let Some(cells) = self.composites.write()?.remove(family) else {
            return Ok(0);
        };
        let now = Instant::now();
        let rows: HashSet<String> = cells
            .into_iter()
            .filter(|(_, (_, expires))| expires.is_none_or(|at| at > now))
            .map(|((row, _, _), _)| row)
            .collect();
        debug!(family, rows = rows.len(), "cleared dictionary family");
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldKind, FieldSpec};

    fn meta() -> EntityMetadata {
        let mut id = FieldSpec::new("id", FieldKind::Text);
        id.identity = true;
        let mut user = FieldSpec::new("user_id", FieldKind::Text);
        user.indexed = true;
        let mut quantity = FieldSpec::new("quantity", FieldKind::Integer);
        quantity.counter = true;
        EntityMetadata::build("Order", vec![id, user, quantity]).unwrap()
    }

    fn order(id: &str, user: &str, quantity: i64) -> Record {
        Record::new(id)
            .with("ID", id)
            .with("USER_ID", user)
            .with("QUANTITY", quantity)
    }

    #[test]
    fn test_save_find_and_delete() {
        let backend = RelationalBackend::default();
        let meta = meta();
        backend.save(&meta, &order("o1", "u1", 3), true).unwrap();

        let found = backend.find(&meta, "o1").unwrap().unwrap();
        assert_eq!(found.get("USER_ID"), Some(&Value::Text("u1".into())));
        assert_eq!(found.get("QUANTITY"), Some(&Value::Integer(3)));

        backend.delete(&meta, "o1").unwrap();
        assert!(backend.find(&meta, "o1").unwrap().is_none());
        assert_eq!(backend.read_ticks(&meta, "o1", "QUANTITY").unwrap(), None);
    }

    #[test]
    fn test_index_lookup() {
        let backend = RelationalBackend::default();
        let meta = meta();
        backend.save(&meta, &order("o1", "u1", 1), false).unwrap();
        backend.save(&meta, &order("o2", "u2", 1), false).unwrap();
        backend.save(&meta, &order("o3", "u1", 1), false).unwrap();

        let hits = backend.find_by_key(&meta, "user_id", &Value::from("u1")).unwrap();
        let keys: Vec<_> = hits.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["o1", "o3"]);

        assert!(matches!(
            backend.find_by_key(&meta, "id", &Value::from("o1")),
            Err(DbError::IndexUnavailable { .. })
        ));
    }

    #[test]
    fn test_dictionary_delete_skips_expired_entries() {
        let backend = RelationalBackend::default();
        backend
            .write_composite("Goals", "acct", "weekly", "score", "1", Some(Duration::ZERO))
            .unwrap();
        backend.write_composite("Goals", "acct", "weekly", "level", "2", None).unwrap();

        assert_eq!(backend.delete_composite("Goals", "acct", "weekly", None).unwrap(), 1);
    }

    #[test]
    fn test_dictionary_family_is_cleared_for_every_row() {
        let backend = RelationalBackend::default();
        backend.write_composite("Goals", "a", "weekly", "score", "1", None).unwrap();
        backend.write_composite("Goals", "a", "daily", "score", "2", None).unwrap();
        backend.write_composite("Goals", "b", "weekly", "score", "3", None).unwrap();

        assert_eq!(backend.delete_composite_family("Goals").unwrap(), 2);
        assert!(backend.find_composites("Goals", "a").unwrap().is_empty());
        assert_eq!(backend.delete_composite_family("Goals").unwrap(), 0);
    }

    #[test]
    fn test_composite_ttl_expires() {
        let backend = RelationalBackend::default();
        backend
            .write_composite("Goals", "acct", "weekly", "score", "1", Some(Duration::ZERO))
            .unwrap();
        backend.write_composite("Goals", "acct", "weekly", "level", "2", None).unwrap();

        let weekly = backend.find_composite("Goals", "acct", "weekly").unwrap();
        assert_eq!(weekly.len(), 1);
        assert!(weekly.contains_key("level"));
    }
}
