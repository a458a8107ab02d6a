use super::bulk::{Page, Pager};
use crate::core::{Record, Result, Value};
use crate::dictionary::Dictionary;
use crate::model::EntityMetadata;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// The storage contract every backend implements.
///
/// All calls block until the backend answers. A lookup miss is `Ok(None)` or
/// an empty collection, never an error.
pub trait StoragePort: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn hosts(&self) -> Vec<String>;

    /// Rows per page used by [`records`].
    fn page_size(&self) -> usize;

    /// Creates the families, tables and indexes `meta` needs.
    fn ensure_schema(&self, meta: &EntityMetadata) -> Result<()>;

    fn find(&self, meta: &EntityMetadata, id: &str) -> Result<Option<Record>>;

    /// Records whose indexed `field` equals `value`. Fails with
    /// `IndexUnavailable` when the field carries no index.
    fn find_by_key(&self, meta: &EntityMetadata, field: &str, value: &Value) -> Result<Vec<Record>>;

    /// One page of live records with keys after `after`.
    fn scan_page(&self, meta: &EntityMetadata, after: Option<&str>, limit: usize) -> Result<Page<Record>>;

    /// Writes every non-counter column. Counter columns are reconciled to the
    /// record's values only when `write_counters` is set.
    fn save(&self, meta: &EntityMetadata, record: &Record, write_counters: bool) -> Result<()>;

    fn count(&self, meta: &EntityMetadata) -> Result<u64>;

    /// Adds `amount` ticks to a counter. Returns `false` when `field` is not a
    /// counter of the entity.
    fn increment(&self, meta: &EntityMetadata, id: &str, field: &str, amount: i64) -> Result<bool>;

    fn get_column_value(&self, meta: &EntityMetadata, id: &str, field: &str) -> Result<Option<Value>>;

    /// Writes one column. On a counter this reconciles to the absolute value.
    fn set_column_value(&self, meta: &EntityMetadata, id: &str, field: &str, value: Value) -> Result<()>;

    fn delete(&self, meta: &EntityMetadata, id: &str) -> Result<()>;

    fn delete_all(&self, meta: &EntityMetadata) -> Result<()>;

    fn write_composite(
        &self,
        family: &str,
        row: &str,
        dictionary: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()>;

    fn find_composite(&self, family: &str, row: &str, dictionary: &str) -> Result<BTreeMap<String, String>>;

    fn find_composites(&self, family: &str, row: &str) -> Result<Vec<Dictionary>>;

    /// Deletes one inner key, or the whole dictionary when `key` is `None`.
    /// Returns the number of columns removed.
    fn delete_composite(&self, family: &str, row: &str, dictionary: &str, key: Option<&str>) -> Result<usize>;

    /// Deletes every dictionary of every row in `family`. Returns the number
    /// of rows cleared.
    fn delete_composite_family(&self, family: &str) -> Result<usize>;
}

pub type PageFetch<T> = Box<dyn FnMut(Option<&str>) -> Result<Page<T>> + Send>;

/// Lazy sequence over every live record of `meta`. Each call starts over.
pub fn records(port: &Arc<dyn StoragePort>, meta: &Arc<EntityMetadata>) -> Pager<Record, PageFetch<Record>> {
    let port = port.clone();
    let meta = meta.clone();
    let limit = port.page_size();
    let fetch: PageFetch<Record> =
        Box::new(move |after: Option<&str>| port.scan_page(&meta, after, limit));
    Pager::new(fetch)
}

/// Writes every changed dictionary of `record` through `port`.
pub(crate) fn write_changed_dictionaries(
    port: &dyn StoragePort,
    meta: &EntityMetadata,
    record: &Record,
) -> Result<usize> {
    let mut written = 0;
    for field in meta.fields() {
        let crate::model::FieldKind::DictionaryList { family } = field.kind() else {
            continue;
        };
        let Some(Value::Dictionaries(dictionaries)) = record.get(field.name()) else {
            continue;
        };
        for dictionary in dictionaries.iter().filter(|d| d.is_changed()) {
            let row = if dictionary.row_key().is_empty() {
                record.key.as_str()
            } else {
                dictionary.row_key()
            };
            for (key, value) in dictionary.entries() {
                port.write_composite(family, row, dictionary.dictionary_key(), key, value, None)?;
                written += 1;
            }
        }
    }
    Ok(written)
}
