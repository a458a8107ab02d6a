// ============================================================================
// cfmapper: typed records over a wide-column store
// ============================================================================

pub mod backend;
pub mod codec;
pub mod connection;
pub mod core;
pub mod dictionary;
pub mod facade;
pub mod model;
pub mod prelude;
pub mod relation;
pub mod result;
pub mod storage;

// Re-export main types for convenience
pub use backend::{ColumnFamilyBackend, RelationalBackend, StoragePort};
pub use connection::{BackendKind, ConsistencyLevel, DiscoveryMode, PoolType, StoreConfig};
pub use crate::core::{DbError, Record, Result, Value};
pub use dictionary::{Dictionary, DictionaryFamily, DictionaryList};
pub use facade::{MonitorStats, Store, StoreMonitor, StoreStatus};
pub use model::{ColumnValue, Entity, EntityDescriptor, FieldDescriptor};
pub use relation::{Relation, RelationList};
pub use result::EntityCursor;
pub use storage::{MemoryStore, WideColumnStore};
