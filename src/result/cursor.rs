use crate::backend::{self, StoragePort};
use crate::core::Result;
use crate::model::{Entity, EntityMapping, HydrationContext};
use std::sync::Arc;

/// Every live record of `T`, read page by page.
///
/// Each call to [`EntityCursor::iter`] starts a fresh scan, so a cursor can be
/// walked any number of times.
pub struct EntityCursor<T: Entity> {
    port: Arc<dyn StoragePort>,
    mapping: Arc<EntityMapping<T>>,
}

impl<T: Entity> EntityCursor<T> {
    pub(crate) fn new(port: Arc<dyn StoragePort>, mapping: Arc<EntityMapping<T>>) -> Self {
        Self { port, mapping }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<T>> + '_ {
        let ctx = HydrationContext::new(self.port.clone());
        backend::records(&self.port, self.mapping.metadata())
            .map(move |record| self.mapping.from_record(record?, &ctx))
    }

    /// Loads every record.
    pub fn fetch(&self) -> Result<Vec<T>> {
        self.iter().collect()
    }

    /// Loads at most `max` records, stopping the scan early.
    pub fn fetch_max(&self, max: usize) -> Result<Vec<T>> {
        self.iter().take(max).collect()
    }

    pub fn first(&self) -> Result<Option<T>> {
        self.iter().next().transpose()
    }

    pub fn count(&self) -> Result<u64> {
        self.port.count(self.mapping.metadata())
    }
}
