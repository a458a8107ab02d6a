use super::bulk::{self, Page, Pager};
use super::composite::CompositeStore;
use super::counter::{self, CounterCells};
use super::port::{self, StoragePort};
use crate::codec;
use crate::connection::StoreConfig;
use crate::core::{DbError, Record, Result, StoredRow, Value};
use crate::dictionary::Dictionary;
use crate::model::{ColumnField, EntityMetadata, FieldKind};
use crate::storage::{FamilyKind, MutationBatch, WideColumnStore};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Storage port over a wide-column store.
///
/// One family per record type keyed by identity, counters in
/// `<Family>_Counters`, dictionaries as composite columns.
pub struct ColumnFamilyBackend {
    store: Arc<dyn WideColumnStore>,
    config: StoreConfig,
    ensured: RwLock<HashSet<String>>,
}

impl ColumnFamilyBackend {
    pub fn new(store: Arc<dyn WideColumnStore>, config: StoreConfig) -> Self {
        Self {
            store,
            config,
            ensured: RwLock::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn WideColumnStore> {
        &self.store
    }

    fn composites(&self) -> CompositeStore<'_> {
        CompositeStore::new(self.store.as_ref(), self.config.read_default, self.config.write_default)
    }

    fn ensure_dictionary_family(&self, family: &str) -> Result<()> {
        if self.ensured.read()?.contains(family) {
            return Ok(());
        }
        self.composites().ensure_family(family)?;
        self.ensured.write()?.insert(family.to_string());
        Ok(())
    }

    /// Hydrates a stored row into a record, or `None` for a tombstone.
    fn hydrate(&self, meta: &EntityMetadata, row: StoredRow) -> Result<Option<Record>> {
        if row.is_tombstone() {
            return Ok(None);
        }

        let cells: BTreeMap<Vec<u8>, Vec<u8>> =
            row.cells.into_iter().map(|cell| (cell.name, cell.value)).collect();
        let mut record = Record::new(row.key.clone());

        for field in meta.fields() {
            if field.is_counter() {
                record.set(field.name(), counter::read(self, meta, &row.key, field)?);
                continue;
            }

            if let FieldKind::DictionaryList { family } = field.kind() {
                let dictionaries = self.find_composites(family, &row.key)?;
                record.set(field.name(), Value::Dictionaries(dictionaries));
                continue;
            }

            let Some(bytes) = cells.get(field.name().as_bytes()) else {
                continue;
            };
            match codec::decode(field.kind(), bytes) {
                Ok(value) => record.set(field.name(), value),
                Err(err) if field.is_identity() => return Err(err),
                Err(err) => {
                    warn!(
                        family = meta.family(),
                        row = %row.key,
                        column = field.name(),
                        error = %err,
                        "unreadable column, using default"
                    );
                }
            }
        }
        Ok(Some(record))
    }

    fn clear_row_counters(&self, meta: &EntityMetadata, id: &str) -> Result<()> {
        for name in meta.counter_field_names() {
            self.store.delete_counter(meta.counter_family(), id, name)?;
        }
        Ok(())
    }

    fn put_column(&self, meta: &EntityMetadata, id: &str, field: &ColumnField, value: &Value, batch: &mut MutationBatch) -> Result<()> {
        let bytes = codec::encode(value)?;
        batch.put(meta.family(), id, field.name().as_bytes().to_vec(), bytes);
        Ok(())
    }
}

impl CounterCells for ColumnFamilyBackend {
    fn read_ticks(&self, meta: &EntityMetadata, row: &str, column: &str) -> Result<Option<i64>> {
        self.store
            .get_counter(meta.counter_family(), row, column, self.config.read_counter)
    }

    fn add_ticks(&self, meta: &EntityMetadata, row: &str, column: &str, amount: i64) -> Result<()> {
        self.store
            .increment_counter(meta.counter_family(), row, column, amount, self.config.write_default)
    }
}

impl StoragePort for ColumnFamilyBackend {
    fn backend_name(&self) -> &'static str {
        "column_family"
    }

    fn hosts(&self) -> Vec<String> {
        self.store.hosts()
    }

    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn ensure_schema(&self, meta: &EntityMetadata) -> Result<()> {
        if self.ensured.read()?.contains(meta.family()) {
            return Ok(());
        }

        self.store.create_family(meta.family(), FamilyKind::Standard)?;
        for field in meta.index_fields() {
            self.store.create_index(meta.family(), field.name().as_bytes())?;
        }
        if meta.has_counters() {
            self.store.create_family(meta.counter_family(), FamilyKind::Counter)?;
        }
        for family in meta.dictionary_families() {
            self.ensure_dictionary_family(family)?;
        }

        debug!(family = meta.family(), "schema ensured");
        self.ensured.write()?.insert(meta.family().to_string());
        Ok(())
    }

    fn find(&self, meta: &EntityMetadata, id: &str) -> Result<Option<Record>> {
        self.ensure_schema(meta)?;
        let row = self.store.get_row(meta.family(), id, self.config.read_default)?;
        self.hydrate(meta, row)
    }

    fn find_by_key(&self, meta: &EntityMetadata, field: &str, value: &Value) -> Result<Vec<Record>> {
        self.ensure_schema(meta)?;
        let column = meta.require_field(field)?;
        if !column.is_indexed() {
            return Err(DbError::IndexUnavailable {
                family: meta.family().to_string(),
                column: column.name().to_string(),
            });
        }

        let value = column.coerce(value.clone())?;
        let keys = self
            .store
            .search_index(meta.family(), column.name().as_bytes(), &codec::encode(&value)?)?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.find(meta, &key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn scan_page(&self, meta: &EntityMetadata, after: Option<&str>, limit: usize) -> Result<Page<Record>> {
        self.ensure_schema(meta)?;
        let page = bulk::live_page(self.store.as_ref(), meta.family(), after, limit, usize::MAX)?;
        let mut items = Vec::with_capacity(page.items.len());
        for row in page.items {
            if let Some(record) = self.hydrate(meta, row)? {
                items.push(record);
            }
        }
        Ok(Page {
            items,
            last_key: page.last_key,
            exhausted: page.exhausted,
        })
    }

    fn save(&self, meta: &EntityMetadata, record: &Record, write_counters: bool) -> Result<()> {
        self.ensure_schema(meta)?;
        let id = record.validate_key()?;

        let mut batch = MutationBatch::new();
        for field in meta.fields() {
            if field.is_counter() || field.kind().is_dictionary() {
                continue;
            }
            self.put_column(meta, id, field, &record.value_or_null(field.name()), &mut batch)?;
        }
        self.store.execute(batch, self.config.write_model)?;
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
        self.ensure_schema(meta)?;
        let store = self.store.as_ref();
        let limit = self.config.page_size;
        let mut total = 0;
        for row in Pager::new(|after| bulk::live_page(store, meta.family(), after, limit, 1)) {
            row?;
            total += 1;
        }
        Ok(total)
    }

    fn increment(&self, meta: &EntityMetadata, id: &str, field: &str, amount: i64) -> Result<bool> {
        let Some(column) = meta.field_for(field).filter(|f| f.is_counter()) else {
            debug!(family = meta.family(), field, "increment on a non-counter field");
            return Ok(false);
        };
        self.ensure_schema(meta)?;
        counter::adjust(self, meta, id, column, amount)?;
        Ok(true)
    }

    fn get_column_value(&self, meta: &EntityMetadata, id: &str, field: &str) -> Result<Option<Value>> {
        let column = meta.require_field(field)?;
        self.ensure_schema(meta)?;

        if column.is_counter() {
            let value = counter::read(self, meta, id, column)?;
            return Ok((!value.is_null()).then_some(value));
        }

        if let FieldKind::DictionaryList { family } = column.kind() {
            return Ok(Some(Value::Dictionaries(self.find_composites(family, id)?)));
        }

        let bytes = self.store.get_column(
            meta.family(),
            id,
            column.name().as_bytes(),
            self.config.read_default,
        )?;
        match bytes {
            Some(bytes) => {
                let value = column.parse_value(codec::decode(column.kind(), &bytes)?);
                Ok((!value.is_null()).then_some(value))
            }
            None => Ok(None),
        }
    }

    fn set_column_value(&self, meta: &EntityMetadata, id: &str, field: &str, value: Value) -> Result<()> {
        let column = meta.require_field(field)?;
        self.ensure_schema(meta)?;

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
        let mut batch = MutationBatch::new();
        self.put_column(meta, id, column, &value, &mut batch)?;
        self.store.execute(batch, self.config.write_default)
    }

    fn delete(&self, meta: &EntityMetadata, id: &str) -> Result<()> {
        self.ensure_schema(meta)?;
        let mut batch = MutationBatch::new();
        batch.delete_row(meta.family(), id);
        self.store.execute(batch, self.config.write_default)?;
        self.clear_row_counters(meta, id)
    }

    fn delete_all(&self, meta: &EntityMetadata) -> Result<()> {
        self.ensure_schema(meta)?;
        let rows = bulk::delete_rows(
            self.store.as_ref(),
            meta.family(),
            self.config.page_size,
            self.config.delete_batch_size,
            self.config.write_default,
        )?;

        let counters = if meta.has_counters() {
            bulk::clear_counters(
                self.store.as_ref(),
                meta.counter_family(),
                self.config.page_size,
                self.config.counter_page_columns,
            )?
        } else {
            0
        };

        debug!(family = meta.family(), rows, counters, "deleted all rows");
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
        self.ensure_dictionary_family(family)?;
        self.composites().write(family, row, dictionary, key, value, ttl)
    }

    fn find_composite(&self, family: &str, row: &str, dictionary: &str) -> Result<BTreeMap<String, String>> {
        self.ensure_dictionary_family(family)?;
        self.composites().find(family, row, dictionary)
    }

    fn find_composites(&self, family: &str, row: &str) -> Result<Vec<Dictionary>> {
        self.ensure_dictionary_family(family)?;
        self.composites().find_all(family, row)
    }

    fn delete_composite(&self, family: &str, row: &str, dictionary: &str, key: Option<&str>) -> Result<usize> {
        self.ensure_dictionary_family(family)?;
        self.composites().delete(family, row, dictionary, key)
    }

    fn delete_composite_family(&self, family: &str) -> Result<usize> {
        self.ensure_dictionary_family(family)?;
        let rows = bulk::delete_rows(
            self.store.as_ref(),
            family,
            self.config.page_size,
            self.config.delete_batch_size,
            self.config.write_default,
        )?;
        debug!(family, rows, "cleared dictionary family");
        Ok(rows)
    }
}
