use crate::codec;
use crate::connection::ConsistencyLevel;
use crate::core::{Cell, Result};
use crate::dictionary::Dictionary;
use crate::storage::{FamilyKind, MutationBatch, WideColumnStore};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Dictionaries kept as `(dictionary_key, inner_key)` composite columns inside
/// one physical row of a dictionary family.
pub struct CompositeStore<'a> {
    store: &'a dyn WideColumnStore,
    read: ConsistencyLevel,
    write: ConsistencyLevel,
}

impl<'a> CompositeStore<'a> {
    pub fn new(store: &'a dyn WideColumnStore, read: ConsistencyLevel, write: ConsistencyLevel) -> Self {
        Self { store, read, write }
    }

    pub fn ensure_family(&self, family: &str) -> Result<()> {
        self.store.create_family(family, FamilyKind::Standard)
    }

    /// Writes a single inner key without touching its siblings.
    pub fn write(
        &self,
        family: &str,
        row: &str,
        dictionary: &str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        debug!(family, row, dictionary, key, "writing composite column");
        let name = codec::encode_composite(&[dictionary, key])?;
        let mut batch = MutationBatch::new();
        batch.put_with_ttl(family, row, name, value.as_bytes().to_vec(), ttl);
        self.store.execute(batch, self.write)
    }

    pub fn find(&self, family: &str, row: &str, dictionary: &str) -> Result<BTreeMap<String, String>> {
        let mut entries = BTreeMap::new();
        for (dict, key, value) in self.columns(family, row)? {
            if dict == dictionary {
                entries.insert(key, value);
            }
        }
        Ok(entries)
    }

    /// Every dictionary stored in `row`, grouped in one pass.
    pub fn find_all(&self, family: &str, row: &str) -> Result<Vec<Dictionary>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (dict, key, value) in self.columns(family, row)? {
            grouped.entry(dict).or_default().insert(key, value);
        }
        Ok(grouped
            .into_iter()
            .map(|(dict, entries)| Dictionary::loaded(row, dict, entries))
            .collect())
    }

    pub fn delete(&self, family: &str, row: &str, dictionary: &str, key: Option<&str>) -> Result<usize> {
        let stored = self.store.get_row(family, row, self.read)?;
        let mut batch = MutationBatch::new();
        for cell in stored.cells {
            let Some((dict, inner, _)) = split(family, row, &cell) else {
                continue;
            };
            if dict == dictionary && key.is_none_or(|k| k == inner) {
                batch.delete_column(family, row, cell.name);
            }
        }

        let removed = batch.len();
        debug!(family, row, dictionary, removed, "deleting composite columns");
        self.store.execute(batch, self.write)?;
        Ok(removed)
    }

    fn columns(&self, family: &str, row: &str) -> Result<Vec<(String, String, String)>> {
        let stored = self.store.get_row(family, row, self.read)?;
        Ok(stored
            .cells
            .iter()
            .filter_map(|cell| split(family, row, cell))
            .collect())
    }
}

fn split(family: &str, row: &str, cell: &Cell) -> Option<(String, String, String)> {
    let parts = match codec::decode_composite(&cell.name) {
        Ok(parts) if parts.len() >= 2 => parts,
        Ok(_) | Err(_) => {
            warn!(family, row, "skipping malformed composite column");
            return None;
        }
    };
    let value = String::from_utf8_lossy(&cell.value).into_owned();
    let mut parts = parts.into_iter();
    Some((parts.next()?, parts.next()?, value))
}
