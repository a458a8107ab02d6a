use crate::connection::ConsistencyLevel;
use crate::core::{Result, StoredRow};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    Standard,
    /// Holds increment-only counter columns.
    Counter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put {
        family: String,
        key: String,
        column: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    DeleteColumn {
        family: String,
        key: String,
        column: Vec<u8>,
    },
    /// Removes every column of the row, leaving a tombstone.
    DeleteRow { family: String, key: String },
}

/// Mutations applied together by [`WideColumnStore::execute`].
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, family: &str, key: &str, column: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.put_with_ttl(family, key, column, value, None)
    }

    pub fn put_with_ttl(
        &mut self,
        family: &str,
        key: &str,
        column: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> &mut Self {
        self.mutations.push(Mutation::Put {
            family: family.to_string(),
            key: key.to_string(),
            column,
            value,
            ttl,
        });
        self
    }

    pub fn delete_column(&mut self, family: &str, key: &str, column: Vec<u8>) -> &mut Self {
        self.mutations.push(Mutation::DeleteColumn {
            family: family.to_string(),
            key: key.to_string(),
            column,
        });
        self
    }

    pub fn delete_row(&mut self, family: &str, key: &str) -> &mut Self {
        self.mutations.push(Mutation::DeleteRow {
            family: family.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Hands the pending mutations over and leaves the batch empty.
    pub fn take(&mut self) -> MutationBatch {
        std::mem::take(self)
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// One page of a range scan, tombstones included.
#[derive(Debug, Clone, Default)]
pub struct RowPage {
    pub rows: Vec<StoredRow>,
}

impl RowPage {
    pub fn last_key(&self) -> Option<&str> {
        self.rows.last().map(|row| row.key.as_str())
    }
}

/// The primitives a wide-column store offers. Regular columns can be written
/// and deleted; counter columns can only be incremented or deleted.
pub trait WideColumnStore: Send + Sync {
    /// Creates the family if it does not exist yet.
    fn create_family(&self, family: &str, kind: FamilyKind) -> Result<()>;

    /// Declares a secondary index on a regular column.
    fn create_index(&self, family: &str, column: &[u8]) -> Result<()>;

    fn get_row(&self, family: &str, key: &str, consistency: ConsistencyLevel) -> Result<StoredRow>;

    fn get_column(
        &self,
        family: &str,
        key: &str,
        column: &[u8],
        consistency: ConsistencyLevel,
    ) -> Result<Option<Vec<u8>>>;

    fn execute(&self, batch: MutationBatch, consistency: ConsistencyLevel) -> Result<()>;

    fn increment_counter(
        &self,
        family: &str,
        key: &str,
        column: &str,
        amount: i64,
        consistency: ConsistencyLevel,
    ) -> Result<()>;

    fn get_counter(
        &self,
        family: &str,
        key: &str,
        column: &str,
        consistency: ConsistencyLevel,
    ) -> Result<Option<i64>>;

    /// Counter deletion is per column and cannot join a batch.
    fn delete_counter(&self, family: &str, key: &str, column: &str) -> Result<()>;

    /// Rows with keys strictly after `after`, in key order, each carrying at
    /// most `column_limit` columns.
    fn scan(
        &self,
        family: &str,
        after: Option<&str>,
        row_limit: usize,
        column_limit: usize,
    ) -> Result<RowPage>;

    /// Row keys whose indexed `column` equals `value`.
    fn search_index(&self, family: &str, column: &[u8], value: &[u8]) -> Result<Vec<String>>;

    fn hosts(&self) -> Vec<String>;
}
