use super::monitor::StoreMonitor;
use crate::backend::{ColumnFamilyBackend, RelationalBackend, StoragePort};
use crate::connection::{BackendKind, StoreConfig};
use crate::core::{DbError, Result, Value};
use crate::dictionary::{Dictionary, DictionaryFamily};
use crate::model::{self, Entity, HydrationContext};
use crate::result::EntityCursor;
use crate::storage::{MemoryStore, WideColumnStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Typed entry point over a storage port.
///
/// Cloning is cheap; clones share the same port.
#[derive(Clone)]
pub struct Store {
    port: Arc<dyn StoragePort>,
    config: StoreConfig,
}

impl Store {
    /// Opens the backend selected by `config.backend`.
    ///
    /// The column-family backend runs over an in-process [`MemoryStore`]
    /// seeded with the configured hosts.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        match config.backend {
            BackendKind::ColumnFamily => {
                let store: Arc<dyn WideColumnStore> = Arc::new(MemoryStore::new(config.seeds.clone()));
                Self::over(store, config)
            }
            BackendKind::Relational => {
                let port = Arc::new(RelationalBackend::new(config.clone()));
                Self::with_port(port, config)
            }
        }
    }

    /// Column-family backend over an existing store.
    pub fn over(store: Arc<dyn WideColumnStore>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let port = Arc::new(ColumnFamilyBackend::new(store, config.clone()));
        Self::with_port(port, config)
    }

    pub fn with_port(port: Arc<dyn StoragePort>, config: StoreConfig) -> Result<Self> {
        info!(
            backend = port.backend_name(),
            keyspace = %config.keyspace,
            hosts = ?port.hosts(),
            "store opened"
        );
        Ok(Self { port, config })
    }

    pub fn port(&self) -> &Arc<dyn StoragePort> {
        &self.port
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn context(&self) -> HydrationContext {
        HydrationContext::new(self.port.clone())
    }

    pub fn find<T: Entity>(&self, id: &str) -> Result<Option<T>> {
        let mapping = model::mapping::<T>()?;
        match self.port.find(mapping.metadata(), id)? {
            Some(record) => mapping.from_record(record, &self.context()).map(Some),
            None => Ok(None),
        }
    }

    /// Records whose indexed `field` equals `value`.
    pub fn find_by_key<T: Entity>(&self, field: &str, value: impl Into<Value>) -> Result<Vec<T>> {
        let mapping = model::mapping::<T>()?;
        let ctx = self.context();
        self.port
            .find_by_key(mapping.metadata(), field, &value.into())?
            .into_iter()
            .map(|record| mapping.from_record(record, &ctx))
            .collect()
    }

    pub fn all<T: Entity>(&self) -> Result<EntityCursor<T>> {
        Ok(EntityCursor::new(self.port.clone(), model::mapping::<T>()?))
    }

    /// Saves every column except counters.
    pub fn save<T: Entity>(&self, entity: &T) -> Result<()> {
        self.save_entity(entity, false)
    }

    /// Saves every column and sets each counter to the entity's value.
    pub fn save_with_counters<T: Entity>(&self, entity: &T) -> Result<()> {
        self.save_entity(entity, true)
    }

    fn save_entity<T: Entity>(&self, entity: &T, write_counters: bool) -> Result<()> {
        let mapping = model::mapping::<T>()?;
        let record = mapping.to_record(entity)?;
        self.port.save(mapping.metadata(), &record, write_counters)
    }

    /// Assigns a random identity when `entity` has none, then saves it with
    /// its counters. Returns the identity.
    pub fn create<T: Entity>(&self, entity: &mut T) -> Result<String> {
        let mapping = model::mapping::<T>()?;
        let id = match mapping.identity_of(entity) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                mapping.assign_identity(entity, &id)?;
                debug!(family = T::FAMILY, id = %id, "generated identity");
                id
            }
        };
        self.save_with_counters(entity)?;
        Ok(id)
    }

    pub fn count<T: Entity>(&self) -> Result<u64> {
        self.port.count(model::mapping::<T>()?.metadata())
    }

    /// Adds `amount` to a counter field. `false` when `field` is not a counter.
    pub fn increment<T: Entity>(&self, id: &str, field: &str, amount: i64) -> Result<bool> {
        self.port.increment(model::mapping::<T>()?.metadata(), id, field, amount)
    }

    /// Adds a decimal amount, converted to the counter's ticks.
    pub fn increment_decimal<T: Entity>(&self, id: &str, field: &str, amount: Decimal) -> Result<bool> {
        let meta = model::metadata::<T>()?;
        let Some(column) = meta.field_for(field).filter(|f| f.is_counter()) else {
            return Ok(false);
        };
        let ticks = column.to_ticks(&Value::Decimal(amount))?;
        self.port.increment(&meta, id, field, ticks)
    }

    pub fn decrement<T: Entity>(&self, id: &str, field: &str, amount: i64) -> Result<bool> {
        let amount = amount
            .checked_neg()
            .ok_or_else(|| DbError::TypeMismatch(format!("cannot negate {}", amount)))?;
        self.increment::<T>(id, field, amount)
    }

    /// Current value of one column, `None` when unset.
    pub fn get<T: Entity>(&self, id: &str, field: &str) -> Result<Option<Value>> {
        self.port.get_column_value(model::mapping::<T>()?.metadata(), id, field)
    }

    /// Writes one column. Counters are driven to the absolute value.
    pub fn set<T: Entity>(&self, id: &str, field: &str, value: impl Into<Value>) -> Result<()> {
        self.port
            .set_column_value(model::mapping::<T>()?.metadata(), id, field, value.into())
    }

    pub fn delete<T: Entity>(&self, id: &str) -> Result<()> {
        self.port.delete(model::mapping::<T>()?.metadata(), id)
    }

    pub fn delete_all<T: Entity>(&self) -> Result<()> {
        self.port.delete_all(model::mapping::<T>()?.metadata())
    }

    /// One dictionary of `row`. Empty when nothing is stored.
    pub fn dictionary<D: DictionaryFamily>(&self, row: &str, dictionary: &str) -> Result<Dictionary> {
        let entries = self.port.find_composite(D::FAMILY, row, dictionary)?;
        Ok(Dictionary::loaded(row, dictionary, entries))
    }

    pub fn dictionaries<D: DictionaryFamily>(&self, row: &str) -> Result<Vec<Dictionary>> {
        self.port.find_composites(D::FAMILY, row)
    }

    pub fn dictionary_keys<D: DictionaryFamily>(&self, row: &str) -> Result<Vec<String>> {
        Ok(self
            .dictionaries::<D>(row)?
            .into_iter()
            .map(|d| d.dictionary_key().to_string())
            .collect())
    }

    pub fn write_dictionary_entry<D: DictionaryFamily>(
        &self,
        row: &str,
        dictionary: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.port
            .write_composite(D::FAMILY, row, dictionary, key, value, ttl)
    }

    /// Removes one entry, or the whole dictionary when `key` is `None`.
    pub fn delete_dictionary<D: DictionaryFamily>(
        &self,
        row: &str,
        dictionary: &str,
        key: Option<&str>,
    ) -> Result<usize> {
        self.port.delete_composite(D::FAMILY, row, dictionary, key)
    }

    /// Removes every dictionary stored under `row`.
    pub fn delete_all_dictionaries<D: DictionaryFamily>(&self, row: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.dictionary_keys::<D>(row)? {
            removed += self.port.delete_composite(D::FAMILY, row, &key, None)?;
        }
        Ok(removed)
    }

    /// Removes every dictionary of every row in `D`'s family.
    pub fn delete_dictionary_family<D: DictionaryFamily>(&self) -> Result<usize> {
        self.port.delete_composite_family(D::FAMILY)
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            backend: self.port.backend_name().to_string(),
            cluster: self.config.cluster.clone(),
            keyspace: self.config.keyspace.clone(),
            read_consistency: self.config.read_default.to_string(),
            write_consistency: self.config.write_default.to_string(),
            model_write_consistency: self.config.write_model.to_string(),
            counter_read_consistency: self.config.read_counter.to_string(),
            discovery: self.config.discovery.to_string(),
            pool_type: self.config.pool_type.to_string(),
            max_conns_per_host: self.config.max_conns_per_host,
            hosts: self.port.hosts(),
        }
    }

    /// Starts background write and delete queues. Needs a tokio runtime.
    pub fn spawn_monitor(&self) -> StoreMonitor {
        StoreMonitor::spawn(self.port.clone())
    }
}

/// Provider report returned by [`Store::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: String,
    pub cluster: String,
    pub keyspace: String,
    pub read_consistency: String,
    pub write_consistency: String,
    pub model_write_consistency: String,
    pub counter_read_consistency: String,
    pub discovery: String,
    pub pool_type: String,
    pub max_conns_per_host: usize,
    pub hosts: Vec<String>,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backend: {}", self.backend)?;
        writeln!(f, "Cluster: {} / keyspace {}", self.cluster, self.keyspace)?;
        writeln!(
            f,
            "Consistency: read {}, write {}, model write {}, counter read {}",
            self.read_consistency,
            self.write_consistency,
            self.model_write_consistency,
            self.counter_read_consistency
        )?;
        writeln!(f, "Discovery: {}", self.discovery)?;
        writeln!(f, "Pool: {} ({} connections per host)", self.pool_type, self.max_conns_per_host)?;
        write!(f, "Hosts: {}", self.hosts.join(", "))
    }
}
