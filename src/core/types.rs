use super::{DbError, Result, Value};
use std::collections::BTreeMap;

/// One named cell of a stored row: raw column name and raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Cell {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A store-level row. An empty cell set is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub key: String,
    pub cells: Vec<Cell>,
}

impl StoredRow {
    pub fn is_tombstone(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A record flattened to physical column names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub key: String,
    pub values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Value of `column`, or `Null` when the record never carried it.
    pub fn value_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn validate_key(&self) -> Result<&str> {
        if self.key.trim().is_empty() {
            return Err(DbError::ExecutionError(
                "record has no identity value".to_string(),
            ));
        }
        Ok(&self.key)
    }
}
