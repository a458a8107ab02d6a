//! Nested key/value sub-records stored as composite columns.
//!
//! A [`Dictionary`] is addressed by `(row_key, dictionary_key)` inside a
//! dictionary family and holds plain string entries. It remembers whether it
//! has been mutated since it was loaded; only changed dictionaries are written
//! back when their owning record is saved.

use crate::core::{DbError, Result, Value};
use crate::model::{ColumnValue, FieldKind, HydrationContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Marker for a dictionary family. The family name is the physical column family.
pub trait DictionaryFamily: Send + Sync + 'static {
    const FAMILY: &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dictionary {
    row_key: String,
    dictionary_key: String,
    entries: BTreeMap<String, String>,
    #[serde(skip)]
    changed: bool,
}

impl Dictionary {
    /// A fresh dictionary. It starts unchanged until the first mutation.
    pub fn new(row_key: impl Into<String>, dictionary_key: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            dictionary_key: dictionary_key.into(),
            entries: BTreeMap::new(),
            changed: false,
        }
    }

    /// A dictionary hydrated from storage.
    pub fn loaded(
        row_key: impl Into<String>,
        dictionary_key: impl Into<String>,
        entries: BTreeMap<String, String>,
    ) -> Self {
        Self {
            row_key: row_key.into(),
            dictionary_key: dictionary_key.into(),
            entries,
            changed: false,
        }
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    pub fn dictionary_key(&self) -> &str {
        &self.dictionary_key
    }

    pub fn set_row_key(&mut self, row_key: impl Into<String>) {
        self.row_key = row_key.into();
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.changed = true;
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    pub fn extend<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.changed = true;
        self.entries
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    pub fn clear(&mut self) {
        self.changed = true;
        self.entries.clear();
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_clean(&mut self) {
        self.changed = false;
    }
}

/// The dictionaries of one family that belong to a record's row.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryList<D> {
    items: Vec<Dictionary>,
    _family: PhantomData<fn() -> D>,
}

impl<D> Default for DictionaryList<D> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            _family: PhantomData,
        }
    }
}

impl<D: DictionaryFamily> DictionaryList<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(&self) -> &'static str {
        D::FAMILY
    }

    pub fn push(&mut self, dictionary: Dictionary) {
        self.items.push(dictionary);
    }

    pub fn get(&self, dictionary_key: &str) -> Option<&Dictionary> {
        self.items
            .iter()
            .find(|d| d.dictionary_key() == dictionary_key)
    }

    /// Returns the dictionary for `dictionary_key`, creating it on `row_key` if absent.
    pub fn entry(&mut self, row_key: &str, dictionary_key: &str) -> &mut Dictionary {
        let position = match self
            .items
            .iter()
            .position(|d| d.dictionary_key() == dictionary_key)
        {
            Some(position) => position,
            None => {
                self.items.push(Dictionary::new(row_key, dictionary_key));
                self.items.len() - 1
            }
        };
        &mut self.items[position]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dictionary> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dictionary_keys(&self) -> Vec<&str> {
        self.items.iter().map(Dictionary::dictionary_key).collect()
    }
}

impl<D: DictionaryFamily> ColumnValue for DictionaryList<D> {
    fn kind() -> FieldKind {
        FieldKind::DictionaryList { family: D::FAMILY }
    }

    fn to_value(&self) -> Value {
        Value::Dictionaries(self.items.clone())
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Dictionaries(items) => Ok(Self {
                items,
                _family: PhantomData,
            }),
            other => Err(DbError::TypeMismatch(format!(
                "expected dictionaries for {}, got {}",
                D::FAMILY,
                other.type_name()
            ))),
        }
    }
}
