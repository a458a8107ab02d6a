use crate::core::{DbError, Result, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A relational row: column name to value.
pub type TableRow = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<String>,
    pub indexes: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes.iter().any(|idx| idx == column)
    }
}

/// Table keyed by primary key. Deletion is physical.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<String, TableRow>,
    indexes: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            indexes: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Inserts or replaces the row stored under `key`.
    pub fn upsert(&mut self, key: &str, row: TableRow) -> Result<()> {
        self.validate_row(&row)?;
        if let Some(old) = self.rows.remove(key) {
            self.remove_from_indexes(key, &old);
        }
        self.update_indexes(key, &row);
        self.rows.insert(key.to_string(), row);
        Ok(())
    }

    /// Writes one column of an existing row, creating the row if needed.
    pub fn update_column(&mut self, key: &str, column: &str, value: Value) -> Result<()> {
        let mut row = self.rows.get(key).cloned().unwrap_or_default();
        row.insert(column.to_string(), value);
        self.upsert(key, row)
    }

    pub fn get(&self, key: &str) -> Option<&TableRow> {
        self.rows.get(key)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        match self.rows.remove(key) {
            Some(old) => {
                self.remove_from_indexes(key, &old);
                true
            }
            None => false,
        }
    }

    pub fn truncate(&mut self) -> usize {
        let removed = self.rows.len();
        self.rows.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
        removed
    }

    /// Rows with keys strictly after `after`, in key order.
    pub fn scan_after(&self, after: Option<&str>, limit: usize) -> Vec<(String, TableRow)> {
        use std::ops::Bound::{Excluded, Unbounded};
        let lower = after.map_or(Unbounded, |k| Excluded(k.to_string()));
        self.rows
            .range((lower, Unbounded))
            .take(limit)
            .map(|(k, row)| (k.clone(), row.clone()))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn create_index(&mut self, column: &str) -> Result<()> {
        if self.indexes.contains_key(column) {
            return Ok(());
        }
        if !self.schema.has_column(column) {
            return Err(DbError::ColumnNotFound(
                column.to_string(),
                self.schema.name.clone(),
            ));
        }
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, row) in &self.rows {
            if let Some(value) = row.get(column) {
                index.entry(index_key(value)).or_default().insert(key.clone());
            }
        }
        self.indexes.insert(column.to_string(), index);
        self.schema.indexes.push(column.to_string());
        Ok(())
    }

    /// Keys of rows whose indexed `column` equals `value`.
    pub fn lookup(&self, column: &str, value: &Value) -> Result<Vec<String>> {
        let index = self.indexes.get(column).ok_or_else(|| DbError::IndexUnavailable {
            family: self.schema.name.clone(),
            column: column.to_string(),
        })?;
        Ok(index
            .get(&index_key(value))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn validate_row(&self, row: &TableRow) -> Result<()> {
        for column in row.keys() {
            if !self.schema.has_column(column) {
                return Err(DbError::ColumnNotFound(
                    column.clone(),
                    self.schema.name.clone(),
                ));
            }
        }
        Ok(())
    }

    fn update_indexes(&mut self, key: &str, row: &TableRow) {
        for (column, index) in &mut self.indexes {
            if let Some(value) = row.get(column) {
                index.entry(index_key(value)).or_default().insert(key.to_string());
            }
        }
    }

    fn remove_from_indexes(&mut self, key: &str, row: &TableRow) {
        for (column, index) in &mut self.indexes {
            if let Some(value) = row.get(column)
                && let Some(keys) = index.get_mut(&index_key(value))
            {
                keys.remove(key);
            }
        }
    }
}

// Index entries compare by rendered value, like bytes on the wire.
fn index_key(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let schema = TableSchema::new("Order", vec!["ORDERID".into(), "USERID".into()]);
        let mut table = Table::new(schema);
        table.create_index("USERID").unwrap();
        table
    }

    fn row(user: &str) -> TableRow {
        [("USERID".to_string(), Value::Text(user.into()))].into_iter().collect()
    }

    #[test]
    fn test_upsert_reindexes() {
        let mut table = table();
        table.upsert("o1", row("u1")).unwrap();
        table.upsert("o1", row("u2")).unwrap();

        assert!(table.lookup("USERID", &Value::Text("u1".into())).unwrap().is_empty());
        assert_eq!(table.lookup("USERID", &Value::Text("u2".into())).unwrap(), vec!["o1"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_lookup_requires_index() {
        let table = table();
        assert!(matches!(
            table.lookup("ORDERID", &Value::Text("o1".into())),
            Err(DbError::IndexUnavailable { .. })
        ));
    }

    #[test]
    fn test_delete_is_physical() {
        let mut table = table();
        table.upsert("o1", row("u1")).unwrap();
        table.upsert("o2", row("u1")).unwrap();
        assert!(table.delete("o1"));
        assert!(!table.delete("o1"));
        let keys: Vec<_> = table.scan_after(None, 10).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["o2"]);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let mut table = table();
        let bad: TableRow = [("NOPE".to_string(), Value::Null)].into_iter().collect();
        assert!(matches!(table.upsert("o1", bad), Err(DbError::ColumnNotFound(_, _))));
    }
}
